//! Reflection controller
//!
//! The orchestrator that drives Generator → Interpreter → Reflector cycles,
//! the termination policy it consults, its phase state machine, observers,
//! and the result it returns.

mod observer;
mod phase;
mod policy;
mod result;
mod runner;

pub use observer::{LoggingObserver, RunObserver};
pub use phase::Phase;
pub use policy::{Decision, StopCause, TerminationPolicy};
pub use result::{RunFailure, RunResult};
pub use runner::{run, ReflectionController, ReflectionControllerBuilder};
