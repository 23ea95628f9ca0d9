//! Controller state machine

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::agent::AgentRole;

use super::policy::StopCause;

/// Where a run is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Generating,
    Critiquing,
    Reflecting,
    StoppedConverged,
    StoppedExhausted,
    StoppedFailed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Phase::StoppedConverged | Phase::StoppedExhausted | Phase::StoppedFailed
        )
    }

    /// Phase in which `role` is invoked
    pub fn for_role(role: AgentRole) -> Self {
        match role {
            AgentRole::Generator => Phase::Generating,
            AgentRole::Interpreter => Phase::Critiquing,
            AgentRole::Reflector => Phase::Reflecting,
        }
    }

    /// Terminal phase for a stop cause. Cancellation shares `StoppedFailed`.
    pub fn stopped(cause: StopCause) -> Self {
        match cause {
            StopCause::Converged => Phase::StoppedConverged,
            StopCause::Exhausted => Phase::StoppedExhausted,
            StopCause::Failed | StopCause::Cancelled => Phase::StoppedFailed,
        }
    }

    /// Whether the controller may move from `self` to `next`
    pub fn can_transition_to(&self, next: Phase) -> bool {
        use Phase::*;
        match (self, next) {
            (Init, Generating) => true,
            (Generating, Critiquing) => true,
            (Critiquing, Reflecting) => true,
            (Reflecting, Generating) => true,
            // Policy stops happen before a cycle starts.
            (Init | Reflecting, StoppedConverged | StoppedExhausted) => true,
            (from, StoppedFailed) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Generating => "generating",
            Phase::Critiquing => "critiquing",
            Phase::Reflecting => "reflecting",
            Phase::StoppedConverged => "stopped_converged",
            Phase::StoppedExhausted => "stopped_exhausted",
            Phase::StoppedFailed => "stopped_failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
