//! Hooks for watching a run as it progresses
//!
//! Observers are called in line with the run, after each phase change,
//! after each appended record and once at the end. They see the same data
//! the caller receives, only earlier, which lets callers persist records
//! incrementally.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::trajectory::IterationRecord;

use super::phase::Phase;
use super::result::RunResult;

/// Trait for run observers
#[async_trait]
pub trait RunObserver: Send + Sync {
    /// Called when the controller changes phase
    async fn on_phase(&self, _run_id: Uuid, _from: Phase, _to: Phase) {}

    /// Called after a record, complete or partial, is appended
    async fn on_record(&self, _run_id: Uuid, _record: &IterationRecord) {}

    /// Called once with the final result
    async fn on_stop(&self, _run_id: Uuid, _result: &RunResult) {}
}

#[async_trait]
impl<T: RunObserver + ?Sized> RunObserver for Arc<T> {
    async fn on_phase(&self, run_id: Uuid, from: Phase, to: Phase) {
        (**self).on_phase(run_id, from, to).await
    }

    async fn on_record(&self, run_id: Uuid, record: &IterationRecord) {
        (**self).on_record(run_id, record).await
    }

    async fn on_stop(&self, run_id: Uuid, result: &RunResult) {
        (**self).on_stop(run_id, result).await
    }
}

/// Observer that logs records and stops through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

#[async_trait]
impl RunObserver for LoggingObserver {
    async fn on_phase(&self, run_id: Uuid, from: Phase, to: Phase) {
        tracing::trace!(%run_id, %from, %to, "Phase changed");
    }

    async fn on_record(&self, run_id: Uuid, record: &IterationRecord) {
        tracing::info!(
            %run_id,
            iteration = record.iteration,
            complete = record.is_complete(),
            confidence = record.confidence,
            critique = record.critique.as_ref().map(|c| c.as_str()).unwrap_or(""),
            duration_ms = record.duration_ms,
            "Iteration recorded"
        );
    }

    async fn on_stop(&self, run_id: Uuid, result: &RunResult) {
        tracing::info!(
            %run_id,
            stop_cause = %result.stop_cause,
            iterations = result.iterations,
            final_confidence = result.final_confidence,
            total_duration_ms = result.total_duration_ms,
            "Run finished"
        );
    }
}
