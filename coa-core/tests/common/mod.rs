//! Shared fakes for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use coa_core::agent::{AgentError, AgentInput, AgentOutput, AgentPort, Agents};
use coa_core::controller::RunObserver;
use coa_core::trajectory::IterationRecord;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

type Script = dyn Fn(usize, &AgentInput) -> Result<AgentOutput, AgentError> + Send + Sync;

/// Agent that answers from a closure of (1-based call number, input) and
/// remembers every input it saw.
pub struct ScriptedAgent {
    name: String,
    script: Box<Script>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    inputs: Mutex<Vec<AgentInput>>,
}

impl ScriptedAgent {
    pub fn new<F>(name: &str, script: F) -> Arc<Self>
    where
        F: Fn(usize, &AgentInput) -> Result<AgentOutput, AgentError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            name: name.to_string(),
            script: Box::new(script),
            delay: None,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        })
    }

    /// Same as [`ScriptedAgent::new`] but sleeps before every reply
    pub fn slow<F>(name: &str, delay: Duration, script: F) -> Arc<Self>
    where
        F: Fn(usize, &AgentInput) -> Result<AgentOutput, AgentError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            name: name.to_string(),
            script: Box::new(script),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<AgentInput> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentPort for ScriptedAgent {
    async fn invoke(&self, input: &AgentInput) -> Result<AgentOutput, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.inputs.lock().unwrap().push(input.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.script)(call, input)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Handles to the three fakes bound into an [`Agents`] record
pub struct Trio {
    pub generator: Arc<ScriptedAgent>,
    pub interpreter: Arc<ScriptedAgent>,
    pub reflector: Arc<ScriptedAgent>,
}

impl Trio {
    pub fn new(
        generator: Arc<ScriptedAgent>,
        interpreter: Arc<ScriptedAgent>,
        reflector: Arc<ScriptedAgent>,
    ) -> Self {
        Self {
            generator,
            interpreter,
            reflector,
        }
    }

    pub fn agents(&self) -> Agents {
        Agents::from_shared(
            self.generator.clone(),
            self.interpreter.clone(),
            self.reflector.clone(),
        )
    }

    pub fn total_calls(&self) -> usize {
        self.generator.calls() + self.interpreter.calls() + self.reflector.calls()
    }
}

pub fn generator_answering(answer: &'static str) -> Arc<ScriptedAgent> {
    ScriptedAgent::new("generator", move |_, _| {
        Ok(AgentOutput::new()
            .with("thoughts", "trivial")
            .with("answer", answer))
    })
}

pub fn interpreter_saying(critique: &'static str) -> Arc<ScriptedAgent> {
    ScriptedAgent::new("interpreter", move |_, _| {
        Ok(AgentOutput::new().with("critique", critique))
    })
}

/// Reflector that keeps the prompt and reports a fixed confidence
pub fn reflector_keeping_prompt(confidence: f64) -> Arc<ScriptedAgent> {
    ScriptedAgent::new("reflector", move |_, input| {
        Ok(AgentOutput::new()
            .with("improved_prompt", input.prompt.clone())
            .with("confidence", confidence))
    })
}

/// Reflector that appends the call number to the prompt and reports the
/// confidences in order, repeating the last one
pub fn reflector_with_confidences(confidences: Vec<f64>) -> Arc<ScriptedAgent> {
    ScriptedAgent::new("reflector", move |call, input| {
        let confidence = confidences
            .get(call - 1)
            .or_else(|| confidences.last())
            .copied()
            .unwrap_or(0.0);
        Ok(AgentOutput::new()
            .with("improved_prompt", format!("{} [rev {}]", input.prompt, call))
            .with("confidence", confidence)
            .with("changes", serde_json::json!([format!("revision {}", call)])))
    })
}

/// Observer that cancels a token once a given iteration has been recorded
pub struct CancelAfterIteration {
    pub token: CancellationToken,
    pub iteration: usize,
}

#[async_trait]
impl RunObserver for CancelAfterIteration {
    async fn on_record(&self, _run_id: Uuid, record: &IterationRecord) {
        if record.iteration == self.iteration {
            self.token.cancel();
        }
    }
}

/// Observer that counts appended records
#[derive(Default)]
pub struct RecordCounter {
    pub records: AtomicUsize,
    pub stops: AtomicUsize,
}

#[async_trait]
impl RunObserver for RecordCounter {
    async fn on_record(&self, _run_id: Uuid, _record: &IterationRecord) {
        self.records.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_stop(&self, _run_id: Uuid, _result: &coa_core::controller::RunResult) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
