//! Trajectory state: the record carried across reflection cycles

mod record;
mod state;

pub use record::{
    clamp_confidence, Critique, FailureCause, GeneratorOutput, Interruption, IterationRecord,
    ReflectionResult, TimeoutBudget,
};
pub use state::{TrajectorySnapshot, TrajectoryState};
