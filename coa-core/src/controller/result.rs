//! What a run hands back to the caller

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::AgentRole;
use crate::trajectory::{FailureCause, IterationRecord, TrajectorySnapshot};

use super::policy::StopCause;

/// Why and where a run stopped early
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub cause: FailureCause,
    /// Cycle in which the stop happened; 0 when no cycle had started
    pub iteration: usize,
    /// Failing role, or the last role to return before a cancellation.
    /// `None` when the stop happened between cycles.
    pub role: Option<AgentRole>,
    pub message: String,
}

/// Final state of a run plus its full trajectory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub final_question: String,
    /// Last reflected prompt, or the initial prompt if no cycle completed
    pub final_prompt: String,
    /// Answer of the last cycle; on `failed`/`cancelled`, of the last
    /// completed cycle
    pub final_answer: Option<String>,
    pub final_confidence: f64,
    /// Cycles started, partial ones included
    pub iterations: usize,
    pub log: Vec<IterationRecord>,
    pub stop_cause: StopCause,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
    pub total_duration_ms: u64,
}

impl RunResult {
    pub(crate) fn from_snapshot(
        run_id: Uuid,
        snapshot: TrajectorySnapshot,
        stop_cause: StopCause,
        failure: Option<RunFailure>,
        total_duration_ms: u64,
    ) -> Self {
        let final_answer = match stop_cause {
            StopCause::Converged | StopCause::Exhausted => snapshot.log.last(),
            StopCause::Failed | StopCause::Cancelled => {
                snapshot.log.iter().rev().find(|r| r.is_complete())
            }
        }
        .and_then(|r| r.answer())
        .map(str::to_string);

        Self {
            run_id,
            final_question: snapshot.question,
            final_prompt: snapshot.prompt,
            final_answer,
            final_confidence: snapshot.confidence,
            iterations: snapshot.iterations,
            log: snapshot.log,
            stop_cause,
            failure,
            total_duration_ms,
        }
    }

    /// Converged or exhausted, as opposed to failed or cancelled
    pub fn is_success(&self) -> bool {
        matches!(self.stop_cause, StopCause::Converged | StopCause::Exhausted)
    }

    pub fn completed_iterations(&self) -> usize {
        self.log.iter().filter(|r| r.is_complete()).count()
    }

    /// Completed record with the highest confidence; the latest wins ties
    pub fn best_record(&self) -> Option<&IterationRecord> {
        self.log
            .iter()
            .filter(|r| r.is_complete())
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    pub fn last_record(&self) -> Option<&IterationRecord> {
        self.log.last()
    }
}
