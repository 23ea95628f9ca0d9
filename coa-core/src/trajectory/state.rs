//! Mutable run state owned by the controller

use serde::{Deserialize, Serialize};

use super::record::{clamp_confidence, Critique, GeneratorOutput, IterationRecord};

/// State carried across cycles.
///
/// Created with [`TrajectoryState::initialize`] at run entry and mutated
/// only by the controller. The counter is bumped once per cycle before the
/// generator runs, and every bumped cycle ends in exactly one appended
/// record, so `log().len() == iterations()` between cycles.
#[derive(Debug, Clone)]
pub struct TrajectoryState {
    question: String,
    initial_prompt: String,
    prompt: String,
    last_output: Option<GeneratorOutput>,
    last_critique: Option<Critique>,
    confidence: f64,
    iterations: usize,
    log: Vec<IterationRecord>,
}

impl TrajectoryState {
    pub fn initialize(question: impl Into<String>, initial_prompt: impl Into<String>) -> Self {
        let initial_prompt = initial_prompt.into();
        Self {
            question: question.into(),
            prompt: initial_prompt.clone(),
            initial_prompt,
            last_output: None,
            last_critique: None,
            confidence: 0.0,
            iterations: 0,
            log: Vec::new(),
        }
    }

    /// Start a cycle and return its 1-based index
    pub fn begin_cycle(&mut self) -> usize {
        self.iterations += 1;
        self.iterations
    }

    /// Append a completed cycle and advance the prompt and confidence from
    /// its reflection. Partial records go through [`Self::push_partial`].
    pub fn append(&mut self, record: IterationRecord) {
        debug_assert_eq!(record.iteration, self.iterations);
        debug_assert!(record.is_complete());

        if let Some(reflection) = &record.reflection {
            self.prompt = reflection.improved_prompt.clone();
            self.confidence = clamp_confidence(Some(reflection.confidence));
        }
        self.absorb_outputs(&record);
        self.log.push(record);
    }

    /// Append an interrupted cycle. Prompt and confidence stay as they were.
    pub fn push_partial(&mut self, record: IterationRecord) {
        debug_assert_eq!(record.iteration, self.iterations);
        self.absorb_outputs(&record);
        self.log.push(record);
    }

    fn absorb_outputs(&mut self, record: &IterationRecord) {
        if let Some(output) = &record.generator_output {
            self.last_output = Some(output.clone());
        }
        if let Some(critique) = &record.critique {
            self.last_critique = Some(critique.clone());
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn initial_prompt(&self) -> &str {
        &self.initial_prompt
    }

    /// Prompt in force for the next cycle
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn log(&self) -> &[IterationRecord] {
        &self.log
    }

    pub fn last_output(&self) -> Option<&GeneratorOutput> {
        self.last_output.as_ref()
    }

    pub fn last_critique(&self) -> Option<&Critique> {
        self.last_critique.as_ref()
    }

    /// Most recent record whose cycle ran to completion
    pub fn last_complete(&self) -> Option<&IterationRecord> {
        self.log.iter().rev().find(|r| r.is_complete())
    }

    /// Read-only projection for callers
    pub fn snapshot(&self) -> TrajectorySnapshot {
        self.clone().into_snapshot()
    }

    pub fn into_snapshot(self) -> TrajectorySnapshot {
        TrajectorySnapshot {
            question: self.question,
            initial_prompt: self.initial_prompt,
            prompt: self.prompt,
            confidence: self.confidence,
            iterations: self.iterations,
            log: self.log,
        }
    }
}

/// Owned, read-only copy of a [`TrajectoryState`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySnapshot {
    pub question: String,
    pub initial_prompt: String,
    pub prompt: String,
    pub confidence: f64,
    pub iterations: usize,
    pub log: Vec<IterationRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentErrorKind, AgentRole};
    use crate::trajectory::{FailureCause, Interruption, ReflectionResult};
    use chrono::Utc;

    fn complete(iteration: usize, prompt: &str, next: &str, confidence: f64) -> IterationRecord {
        IterationRecord::complete(
            iteration,
            prompt,
            GeneratorOutput::new("thinking", format!("answer {}", iteration)),
            Critique::no_issues(),
            ReflectionResult::new(next, confidence),
            Utc::now(),
            0,
        )
    }

    #[test]
    fn test_initialize() {
        let state = TrajectoryState::initialize("What is 2+2?", "Answer concisely.");
        assert_eq!(state.iterations(), 0);
        assert_eq!(state.confidence(), 0.0);
        assert_eq!(state.prompt(), "Answer concisely.");
        assert!(state.log().is_empty());
        assert!(state.last_output().is_none());
    }

    #[test]
    fn test_append_advances_prompt_and_confidence() {
        let mut state = TrajectoryState::initialize("q", "p0");

        let n = state.begin_cycle();
        state.append(complete(n, "p0", "p1", 0.4));
        let n = state.begin_cycle();
        state.append(complete(n, "p1", "p2", 0.3));

        assert_eq!(state.iterations(), 2);
        assert_eq!(state.log().len(), 2);
        assert_eq!(state.prompt(), "p2");
        assert_eq!(state.initial_prompt(), "p0");
        assert_eq!(state.confidence(), 0.3);
        assert_eq!(state.last_output().unwrap().answer, "answer 2");
    }

    #[test]
    fn test_partial_keeps_prompt() {
        let mut state = TrajectoryState::initialize("q", "p0");
        let n = state.begin_cycle();
        state.append(complete(n, "p0", "p1", 0.4));

        let n = state.begin_cycle();
        state.push_partial(IterationRecord::partial(
            n,
            state.prompt().to_string(),
            Some(GeneratorOutput::new("", "partial")),
            None,
            state.confidence(),
            Interruption {
                cause: FailureCause::Agent {
                    kind: AgentErrorKind::Permanent,
                },
                role: AgentRole::Interpreter,
                message: "down".to_string(),
            },
            Utc::now(),
            0,
        ));

        assert_eq!(state.log().len(), state.iterations());
        assert_eq!(state.prompt(), "p1");
        assert_eq!(state.confidence(), 0.4);
        assert_eq!(state.last_complete().unwrap().iteration, 1);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.iterations, 2);
        assert_eq!(snapshot.log.len(), 2);
    }
}
