//! Per-cycle records and the normalized agent outputs they hold

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::agent::{keys, AgentError, AgentErrorKind, AgentOutput, AgentRole};

/// Clamp an agent-reported confidence into `[0.0, 1.0]`.
///
/// Missing and NaN values read as `0.0`.
pub fn clamp_confidence(value: Option<f64>) -> f64 {
    match value {
        Some(v) if !v.is_nan() => v.clamp(0.0, 1.0),
        _ => 0.0,
    }
}

/// Generator output: a reasoning trace and an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorOutput {
    pub thoughts: String,
    pub answer: String,
    /// Keys the controller does not read, e.g. token counts
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl GeneratorOutput {
    pub fn new(thoughts: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            thoughts: thoughts.into(),
            answer: answer.into(),
            extra: Map::new(),
        }
    }

    /// Normalize a raw generator bundle.
    ///
    /// Missing `thoughts` reads as empty. A missing or null `answer` is
    /// malformed output.
    pub fn from_output(output: &AgentOutput) -> Result<Self, AgentError> {
        let answer = output
            .get_text(keys::ANSWER)
            .ok_or_else(|| AgentError::missing_key(AgentRole::Generator, keys::ANSWER))?;

        Ok(Self {
            thoughts: output.get_text(keys::THOUGHTS).unwrap_or_default(),
            answer,
            extra: output.extras(AgentRole::Generator.output_keys()),
        })
    }
}

/// Interpreter verdict on the latest generator output.
///
/// Free-form text. A few tags carry meaning for reflectors; the controller
/// never inspects them beyond normalizing an empty critique to
/// [`Critique::NO_ISSUES_FOUND`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Critique(String);

impl Critique {
    pub const NO_ISSUES_FOUND: &'static str = "no_issues_found";
    pub const INVALID_ASSUMPTION: &'static str = "invalid_assumption";
    pub const MISSING_VERIFICATION_STEP: &'static str = "missing_verification_step";

    /// Wrap critique text; blank text becomes the no-issues sentinel
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.trim().is_empty() {
            Self::no_issues()
        } else {
            Self(text)
        }
    }

    pub fn no_issues() -> Self {
        Self(Self::NO_ISSUES_FOUND.to_string())
    }

    pub fn from_output(output: &AgentOutput) -> Self {
        Self::new(output.get_text(keys::CRITIQUE).unwrap_or_default())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_no_issues(&self) -> bool {
        self.0.trim() == Self::NO_ISSUES_FOUND
    }

    /// Whether the critique mentions a tag anywhere in its text
    pub fn has_tag(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }
}

impl fmt::Display for Critique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reflector output after normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionResult {
    /// Prompt for the next cycle, never empty
    pub improved_prompt: String,
    /// Clamped to `[0.0, 1.0]`
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl ReflectionResult {
    pub fn new(improved_prompt: impl Into<String>, confidence: f64) -> Self {
        Self {
            improved_prompt: improved_prompt.into(),
            confidence: clamp_confidence(Some(confidence)),
            changes: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Normalize a raw reflector bundle against the prompt in force.
    ///
    /// A missing or blank `improved_prompt` keeps `current_prompt`; a
    /// missing or non-numeric `confidence` reads as `0.0`.
    pub fn from_output(output: &AgentOutput, current_prompt: &str) -> Self {
        let improved_prompt = output
            .get_text(keys::IMPROVED_PROMPT)
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| current_prompt.to_string());

        Self {
            improved_prompt,
            confidence: clamp_confidence(output.get_f64(keys::CONFIDENCE)),
            changes: output.get_string_list(keys::CHANGES).unwrap_or_default(),
            extra: output.extras(AgentRole::Reflector.output_keys()),
        }
    }
}

/// Which wall-clock budget ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutBudget {
    Cycle,
    Run,
}

impl fmt::Display for TimeoutBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutBudget::Cycle => f.write_str("per-cycle"),
            TimeoutBudget::Run => f.write_str("run"),
        }
    }
}

/// Why a cycle did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum FailureCause {
    /// An agent returned an error
    Agent { kind: AgentErrorKind },
    /// The caller's cancellation token fired
    Cancelled,
    /// A wall-clock budget was exceeded
    TimedOut { budget: TimeoutBudget },
}

impl FailureCause {
    /// Cancellation and timeouts stop the run as `cancelled`, agent errors
    /// as `failed`.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, FailureCause::Cancelled | FailureCause::TimedOut { .. })
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Agent { kind } => write!(f, "{} agent error", kind),
            FailureCause::Cancelled => f.write_str("cancelled"),
            FailureCause::TimedOut { budget } => write!(f, "{} timeout", budget),
        }
    }
}

/// Annotation on a record whose cycle was cut short
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interruption {
    pub cause: FailureCause,
    /// Role that failed, or the last role that returned before the stop
    pub role: AgentRole,
    pub message: String,
}

/// Snapshot of one Generator → Interpreter → Reflector cycle.
///
/// A complete record has all three outputs. A partial record is appended
/// when a cycle is interrupted after the generator was invoked; it keeps
/// whatever outputs were produced and carries an [`Interruption`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based cycle index
    pub iteration: usize,
    pub prompt_at_entry: String,
    pub generator_output: Option<GeneratorOutput>,
    pub critique: Option<Critique>,
    /// Interpreter keys other than the critique, e.g. token counts
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub interpreter_extra: Map<String, Value>,
    pub reflection: Option<ReflectionResult>,
    /// Confidence at exit; unchanged from entry for partial records
    pub confidence: f64,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interruption: Option<Interruption>,
}

impl IterationRecord {
    /// Record for a cycle where all three agents returned
    pub fn complete(
        iteration: usize,
        prompt_at_entry: impl Into<String>,
        generator_output: GeneratorOutput,
        critique: Critique,
        reflection: ReflectionResult,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        Self {
            iteration,
            prompt_at_entry: prompt_at_entry.into(),
            generator_output: Some(generator_output),
            critique: Some(critique),
            interpreter_extra: Map::new(),
            confidence: reflection.confidence,
            reflection: Some(reflection),
            started_at,
            duration_ms,
            interruption: None,
        }
    }

    /// Record for an interrupted cycle
    #[allow(clippy::too_many_arguments)]
    pub fn partial(
        iteration: usize,
        prompt_at_entry: impl Into<String>,
        generator_output: Option<GeneratorOutput>,
        critique: Option<Critique>,
        confidence: f64,
        interruption: Interruption,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        Self {
            iteration,
            prompt_at_entry: prompt_at_entry.into(),
            generator_output,
            critique,
            interpreter_extra: Map::new(),
            reflection: None,
            confidence,
            started_at,
            duration_ms,
            interruption: Some(interruption),
        }
    }

    pub fn with_interpreter_extra(mut self, extra: Map<String, Value>) -> Self {
        self.interpreter_extra = extra;
        self
    }

    pub fn is_complete(&self) -> bool {
        self.reflection.is_some() && self.interruption.is_none()
    }

    pub fn answer(&self) -> Option<&str> {
        self.generator_output.as_ref().map(|g| g.answer.as_str())
    }

    pub fn improved_prompt(&self) -> Option<&str> {
        self.reflection.as_ref().map(|r| r.improved_prompt.as_str())
    }
}
