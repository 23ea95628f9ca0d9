//! Trajectory export

use crate::controller::RunResult;

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrajectoryFormat {
    /// JSON format
    Json,
    /// Pretty-printed JSON
    JsonPretty,
    /// Human-readable summary
    Summary,
}

/// Renders a finished run for logs, files or terminals
pub struct TrajectoryExporter;

impl TrajectoryExporter {
    /// Export to JSON
    pub fn to_json(result: &RunResult) -> Result<String, serde_json::Error> {
        serde_json::to_string(result)
    }

    /// Export to pretty JSON
    pub fn to_json_pretty(result: &RunResult) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(result)
    }

    /// Parse a run previously exported as JSON
    pub fn from_json(json: &str) -> Result<RunResult, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Export to summary format
    pub fn to_summary(result: &RunResult) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Reflection Run: {}", result.run_id));
        lines.push(format!("Question: {}", result.final_question));
        lines.push(format!("Stop Cause: {}", result.stop_cause));

        if let Some(ref failure) = result.failure {
            let role = failure.role.map(|r| r.as_str()).unwrap_or("-");
            lines.push(format!(
                "Failure: {} (iteration {}, role {}): {}",
                failure.cause, failure.iteration, role, failure.message
            ));
        }

        lines.push(String::new());
        lines.push("Summary:".to_string());
        lines.push(format!("  Iterations: {}", result.iterations));
        lines.push(format!("  Completed: {}", result.completed_iterations()));
        lines.push(format!("  Final Confidence: {:.2}", result.final_confidence));
        lines.push(format!(
            "  Final Answer: {}",
            result.final_answer.as_deref().unwrap_or("<none>")
        ));
        lines.push(format!("  Duration: {}ms", result.total_duration_ms));

        if !result.log.is_empty() {
            lines.push(String::new());
            lines.push("Iterations:".to_string());
        }
        for record in &result.log {
            let status = if record.is_complete() { "ok" } else { "partial" };
            lines.push(format!(
                "  #{} [{}] confidence={:.2} answer={} critique={}",
                record.iteration,
                status,
                record.confidence,
                record.answer().unwrap_or("-"),
                record.critique.as_ref().map(|c| c.as_str()).unwrap_or("-"),
            ));
            if let Some(reflection) = &record.reflection {
                for change in &reflection.changes {
                    lines.push(format!("      change: {}", change));
                }
            }
        }

        lines.join("\n")
    }

    /// Export in specified format
    pub fn export(
        result: &RunResult,
        format: TrajectoryFormat,
    ) -> Result<String, serde_json::Error> {
        match format {
            TrajectoryFormat::Json => Self::to_json(result),
            TrajectoryFormat::JsonPretty => Self::to_json_pretty(result),
            TrajectoryFormat::Summary => Ok(Self::to_summary(result)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentErrorKind, AgentRole};
    use crate::controller::{RunFailure, StopCause};
    use crate::trajectory::{
        Critique, FailureCause, GeneratorOutput, Interruption, IterationRecord, ReflectionResult,
    };
    use chrono::Utc;
    use uuid::Uuid;

    fn sample() -> RunResult {
        let mut reflection = ReflectionResult::new("Answer concisely. Verify.", 0.7);
        reflection.changes = vec!["added verification".to_string()];

        let complete = IterationRecord::complete(
            1,
            "Answer concisely.",
            GeneratorOutput::new("trivial", "4"),
            Critique::new(Critique::MISSING_VERIFICATION_STEP),
            reflection,
            Utc::now(),
            12,
        );
        let interruption = Interruption {
            cause: FailureCause::Agent {
                kind: AgentErrorKind::Permanent,
            },
            role: AgentRole::Interpreter,
            message: "permanent agent error: quota".to_string(),
        };
        let partial = IterationRecord::partial(
            2,
            "Answer concisely. Verify.",
            Some(GeneratorOutput::new("checked", "4")),
            None,
            0.7,
            interruption,
            Utc::now(),
            3,
        );

        RunResult {
            run_id: Uuid::new_v4(),
            final_question: "What is 2+2?".to_string(),
            final_prompt: "Answer concisely. Verify.".to_string(),
            final_answer: Some("4".to_string()),
            final_confidence: 0.7,
            iterations: 2,
            log: vec![complete, partial],
            stop_cause: StopCause::Failed,
            failure: Some(RunFailure {
                cause: FailureCause::Agent {
                    kind: AgentErrorKind::Permanent,
                },
                iteration: 2,
                role: Some(AgentRole::Interpreter),
                message: "permanent agent error: quota".to_string(),
            }),
            total_duration_ms: 20,
        }
    }

    #[test]
    fn test_json_round_trip() {
        let result = sample();
        let json = TrajectoryExporter::to_json(&result).unwrap();
        assert!(json.contains("\"stop_cause\":\"failed\""));
        assert_eq!(TrajectoryExporter::from_json(&json).unwrap(), result);
    }

    #[test]
    fn test_summary() {
        let summary = TrajectoryExporter::to_summary(&sample());
        assert!(summary.contains("Stop Cause: failed"));
        assert!(summary.contains("role interpreter"));
        assert!(summary.contains(
            "#1 [ok] confidence=0.70 answer=4 critique=missing_verification_step"
        ));
        assert!(summary.contains("#2 [partial]"));
        assert!(summary.contains("change: added verification"));
        assert!(summary.contains("Completed: 1"));
    }

    #[test]
    fn test_export_dispatch() {
        let result = sample();
        let pretty = TrajectoryExporter::export(&result, TrajectoryFormat::JsonPretty).unwrap();
        assert!(pretty.contains('\n'));
        let summary = TrajectoryExporter::export(&result, TrajectoryFormat::Summary).unwrap();
        assert!(summary.starts_with("Reflection Run:"));
    }
}
