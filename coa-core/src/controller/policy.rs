//! Termination policy evaluated before every prospective cycle

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ControllerConfig;
use crate::trajectory::TrajectoryState;

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCause {
    /// Confidence reached the threshold
    Converged,
    /// The iteration ceiling was reached below the threshold
    Exhausted,
    /// An agent failed
    Failed,
    /// The cancellation token fired or a wall-clock budget ran out
    Cancelled,
}

impl StopCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopCause::Converged => "converged",
            StopCause::Exhausted => "exhausted",
            StopCause::Failed => "failed",
            StopCause::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a policy check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Stop(StopCause),
}

impl Decision {
    pub fn is_stop(&self) -> bool {
        matches!(self, Decision::Stop(_))
    }
}

/// Decides between another cycle and stopping.
///
/// Rules, in order:
/// 1. counter ≥ max iterations: stop. The cause is `converged` when the
///    final confidence also meets the threshold, `exhausted` otherwise.
/// 2. confidence ≥ threshold: stop as `converged`.
/// 3. otherwise continue.
///
/// The comparison is non-strict, so a threshold of `0.0` stops before the
/// first cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerminationPolicy {
    max_iterations: usize,
    threshold: f64,
}

impl TerminationPolicy {
    pub fn new(max_iterations: usize, threshold: f64) -> Self {
        Self {
            max_iterations,
            threshold,
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(config.max_iterations, config.confidence_threshold)
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn evaluate(&self, state: &TrajectoryState) -> Decision {
        self.decide(state.iterations(), state.confidence())
    }

    pub fn decide(&self, iterations: usize, confidence: f64) -> Decision {
        let converged = confidence >= self.threshold;
        if iterations >= self.max_iterations {
            // The last permitted cycle may also have converged.
            return Decision::Stop(if converged && iterations > 0 {
                StopCause::Converged
            } else {
                StopCause::Exhausted
            });
        }
        if converged {
            return Decision::Stop(StopCause::Converged);
        }
        Decision::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continue_below_threshold() {
        let policy = TerminationPolicy::new(3, 0.85);
        assert_eq!(policy.decide(0, 0.0), Decision::Continue);
        assert_eq!(policy.decide(2, 0.84), Decision::Continue);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let policy = TerminationPolicy::new(3, 0.85);
        assert_eq!(policy.decide(1, 0.85), Decision::Stop(StopCause::Converged));
    }

    #[test]
    fn test_exhaustion() {
        let policy = TerminationPolicy::new(2, 0.99);
        assert_eq!(policy.decide(2, 0.7), Decision::Stop(StopCause::Exhausted));
    }

    #[test]
    fn test_converged_on_last_cycle() {
        let policy = TerminationPolicy::new(2, 0.8);
        assert_eq!(policy.decide(2, 0.9), Decision::Stop(StopCause::Converged));
    }

    #[test]
    fn test_zero_max_iterations() {
        let policy = TerminationPolicy::new(0, 0.85);
        assert_eq!(policy.decide(0, 0.0), Decision::Stop(StopCause::Exhausted));
    }

    #[test]
    fn test_zero_threshold_stops_immediately() {
        let policy = TerminationPolicy::new(3, 0.0);
        assert!(policy.decide(0, 0.0).is_stop());
    }

    #[test]
    fn test_stop_cause_serde() {
        assert_eq!(serde_json::to_string(&StopCause::Cancelled).unwrap(), "\"cancelled\"");
        assert_eq!(StopCause::Exhausted.to_string(), "exhausted");
    }
}
