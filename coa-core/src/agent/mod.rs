//! Agents: the port the controller drives, plus adapters and wrappers
//!
//! An agent is an opaque async callable from an [`AgentInput`] bundle to an
//! [`AgentOutput`] bundle. The controller binds exactly one agent to each
//! [`AgentRole`] through [`Agents`].

mod adapter;
mod error;
mod port;
mod retry;

pub use adapter::{agent_fn, llm_agent, render_template, FnAgent, LlmAgent, OutputFormat};
pub use error::{AgentError, AgentErrorKind};
pub use port::{
    keys, AgentInput, AgentOutput, AgentPort, AgentRole, Agents, AgentsBuilder, SharedAgent,
};
pub use retry::{with_retry_if, RetryConfig, RetryingAgent};
