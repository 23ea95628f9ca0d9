//! # coa-core: Chain-of-Agents reflection controller
//!
//! A Generator proposes an answer, an Interpreter critiques it, and a
//! Reflector rewrites the controlling prompt and reports a confidence. The
//! controller repeats that cycle until the confidence reaches a threshold,
//! the iteration budget runs out, an agent fails, or the caller cancels,
//! and hands back the final state plus the full trajectory.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use coa_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> coa_core::Result<()> {
//!     let agents = Agents::builder()
//!         .generator(agent_fn("generator", |_| async {
//!             Ok(AgentOutput::new().with("thoughts", "2 + 2 = 4").with("answer", "4"))
//!         }))
//!         .interpreter(agent_fn("interpreter", |_| async {
//!             Ok(AgentOutput::new().with("critique", "no_issues_found"))
//!         }))
//!         .reflector(agent_fn("reflector", |input| async move {
//!             Ok(AgentOutput::new()
//!                 .with("improved_prompt", input.prompt)
//!                 .with("confidence", 0.9))
//!         }))
//!         .build()?;
//!
//!     let config = ControllerConfig::default().with_confidence_threshold(0.5);
//!     let result = coa_core::run("What is 2+2?", "Answer concisely.", agents, config).await?;
//!
//!     println!("{}", TrajectoryExporter::to_summary(&result));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **agent**: the Agent Port trait, role binding, retry wrapper and adapters
//! - **trajectory**: per-cycle records and the run state
//! - **controller**: termination policy, phase machine, observers and the loop
//! - **llm** / **parsing**: the provider seam and reply parsing used by
//!   [`agent::llm_agent`]
//! - **config**: controller and retry configuration, loadable with figment
//! - **export**: JSON and summary rendering of finished runs

pub mod agent;
pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod llm;
pub mod parsing;
pub mod trajectory;

pub use controller::run;
pub use error::{CoaError, Result};

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::agent::{
        agent_fn, llm_agent, AgentError, AgentErrorKind, AgentInput, AgentOutput, AgentPort,
        AgentRole, Agents, OutputFormat, RetryConfig, RetryingAgent,
    };
    pub use crate::config::{CoaConfig, ControllerConfig, RunOverrides};
    pub use crate::controller::{
        LoggingObserver, Phase, ReflectionController, RunFailure, RunObserver, RunResult,
        StopCause,
    };
    pub use crate::error::{CoaError, Result};
    pub use crate::export::TrajectoryExporter;
    pub use crate::llm::{LLMProvider, LLMRequest, LLMResponse, ProviderError};
    pub use crate::trajectory::{
        Critique, FailureCause, GeneratorOutput, IterationRecord, ReflectionResult,
        TrajectoryState,
    };
    pub use tokio_util::sync::CancellationToken;
}
