//! The reflection loop
//!
//! A run drives Generator → Interpreter → Reflector cycles over one
//! [`TrajectoryState`] until the [`TerminationPolicy`] stops it, an agent
//! fails, or the caller cancels. Everything happens on the calling task:
//! the three invocations of a cycle are sequential, and so are the cycles.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::agent::{
    AgentError, AgentInput, AgentOutput, AgentPort, AgentRole, Agents, AgentsBuilder,
};
use crate::config::{ControllerConfig, RunOverrides};
use crate::error::{CoaError, Result};
use crate::trajectory::{
    Critique, FailureCause, GeneratorOutput, Interruption, IterationRecord, ReflectionResult,
    TimeoutBudget, TrajectoryState,
};

use super::observer::RunObserver;
use super::phase::Phase;
use super::policy::{Decision, StopCause, TerminationPolicy};
use super::result::{RunFailure, RunResult};

/// Orchestrates reflection runs over a fixed set of agents.
///
/// The controller itself holds no per-run state, so one instance can serve
/// many concurrent runs.
///
/// ```rust,no_run
/// use coa_core::agent::{agent_fn, AgentOutput};
/// use coa_core::controller::ReflectionController;
///
/// # async fn demo() -> coa_core::Result<()> {
/// let controller = ReflectionController::builder()
///     .generator(agent_fn("gen", |_| async {
///         Ok(AgentOutput::new().with("thoughts", "2 and 2 make 4").with("answer", "4"))
///     }))
///     .interpreter(agent_fn("critic", |_| async {
///         Ok(AgentOutput::new().with("critique", "no_issues_found"))
///     }))
///     .reflector(agent_fn("reflect", |input| async move {
///         Ok(AgentOutput::new()
///             .with("improved_prompt", input.prompt)
///             .with("confidence", 0.9))
///     }))
///     .max_iterations(3)
///     .build()?;
///
/// let result = controller.run("What is 2+2?", "Answer concisely.").await?;
/// assert_eq!(result.final_answer.as_deref(), Some("4"));
/// # Ok(())
/// # }
/// ```
pub struct ReflectionController {
    agents: Agents,
    config: ControllerConfig,
    observers: Vec<Arc<dyn RunObserver>>,
}

impl std::fmt::Debug for ReflectionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReflectionController")
            .field("agents", &self.agents)
            .field("config", &self.config)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ReflectionController {
    /// Create a controller.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid.
    pub fn new(agents: Agents, config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            agents,
            config,
            observers: Vec::new(),
        })
    }

    pub fn builder() -> ReflectionControllerBuilder {
        ReflectionControllerBuilder::default()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn agents(&self) -> &Agents {
        &self.agents
    }

    /// Run with the controller's configuration
    pub async fn run(&self, question: &str, initial_prompt: &str) -> Result<RunResult> {
        self.run_with(question, initial_prompt, RunOverrides::default())
            .await
    }

    /// Run with per-run overrides of the iteration ceiling and threshold.
    ///
    /// Agent failures, cancellation and timeouts end the run normally and are
    /// reported through [`RunResult::stop_cause`] and [`RunResult::failure`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid overrides and a validation
    /// error for a blank question or prompt. No agent is called in either
    /// case.
    pub async fn run_with(
        &self,
        question: &str,
        initial_prompt: &str,
        overrides: RunOverrides,
    ) -> Result<RunResult> {
        let config = self.config.with_overrides(&overrides);
        config.validate()?;
        validate_inputs(question, initial_prompt)?;

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "reflection_run",
            %run_id,
            max_iterations = config.max_iterations,
            threshold = config.confidence_threshold
        );

        let run = Run::new(self, config, run_id, question, initial_prompt);
        Ok(run.execute().instrument(span).await)
    }
}

fn validate_inputs(question: &str, initial_prompt: &str) -> Result<()> {
    if question.trim().is_empty() {
        return Err(CoaError::Validation("question must not be empty".to_string()));
    }
    if initial_prompt.trim().is_empty() {
        return Err(CoaError::Validation(
            "initial prompt must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Builder for [`ReflectionController`]
#[derive(Default)]
pub struct ReflectionControllerBuilder {
    agents: AgentsBuilder,
    config: ControllerConfig,
    observers: Vec<Arc<dyn RunObserver>>,
}

impl ReflectionControllerBuilder {
    pub fn generator(mut self, agent: impl AgentPort + 'static) -> Self {
        self.agents = self.agents.generator(agent);
        self
    }

    pub fn interpreter(mut self, agent: impl AgentPort + 'static) -> Self {
        self.agents = self.agents.interpreter(agent);
        self
    }

    pub fn reflector(mut self, agent: impl AgentPort + 'static) -> Self {
        self.agents = self.agents.reflector(agent);
        self
    }

    /// Bind all three roles at once
    pub fn agents(mut self, agents: &Agents) -> Self {
        for role in AgentRole::ALL {
            self.agents = self.agents.role(role, agents.get(role).clone());
        }
        self
    }

    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn confidence_threshold(mut self, threshold: f64) -> Self {
        self.config.confidence_threshold = threshold;
        self
    }

    pub fn per_cycle_timeout(mut self, timeout: Duration) -> Self {
        self.config.per_cycle_timeout = Some(timeout);
        self
    }

    pub fn run_timeout(mut self, timeout: Duration) -> Self {
        self.config.run_timeout = Some(timeout);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.config.cancellation = Some(token);
        self
    }

    pub fn observer(mut self, observer: impl RunObserver + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Build the controller.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a role is unbound or the
    /// configuration is invalid.
    pub fn build(self) -> Result<ReflectionController> {
        let mut controller = ReflectionController::new(self.agents.build()?, self.config)?;
        controller.observers = self.observers;
        Ok(controller)
    }
}

/// Run a single reflection loop without keeping a controller around
pub async fn run(
    question: &str,
    initial_prompt: &str,
    agents: Agents,
    config: ControllerConfig,
) -> Result<RunResult> {
    ReflectionController::new(agents, config)?
        .run(question, initial_prompt)
        .await
}

/// Outputs gathered so far in the current cycle
struct CycleProgress {
    iteration: usize,
    prompt: String,
    started_at: DateTime<Utc>,
    started: Instant,
    deadline: Option<Instant>,
    generator_output: Option<GeneratorOutput>,
    critique: Option<Critique>,
    interpreter_extra: Map<String, Value>,
}

impl CycleProgress {
    fn duration_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// State of one in-flight run
struct Run<'a> {
    agents: &'a Agents,
    observers: &'a [Arc<dyn RunObserver>],
    config: ControllerConfig,
    policy: TerminationPolicy,
    run_id: Uuid,
    state: TrajectoryState,
    phase: Phase,
    started: Instant,
    deadline: Option<Instant>,
}

impl<'a> Run<'a> {
    fn new(
        controller: &'a ReflectionController,
        config: ControllerConfig,
        run_id: Uuid,
        question: &str,
        initial_prompt: &str,
    ) -> Self {
        let started = Instant::now();
        Self {
            agents: &controller.agents,
            observers: &controller.observers,
            policy: TerminationPolicy::from_config(&config),
            deadline: config.run_timeout.map(|t| started + t),
            config,
            run_id,
            state: TrajectoryState::initialize(question, initial_prompt),
            phase: Phase::Init,
            started,
        }
    }

    async fn execute(mut self) -> RunResult {
        tracing::info!(
            question_len = self.state.question().len(),
            "Reflection run started"
        );

        loop {
            if let Some(failure) = self.interrupted_between_cycles() {
                return self.finish(StopCause::Cancelled, Some(failure)).await;
            }

            if let Decision::Stop(cause) = self.policy.evaluate(&self.state) {
                return self.finish(cause, None).await;
            }

            if let Err(failure) = self.cycle().await {
                let cause = if failure.cause.is_cancellation() {
                    StopCause::Cancelled
                } else {
                    StopCause::Failed
                };
                return self.finish(cause, Some(failure)).await;
            }
        }
    }

    fn interrupted_between_cycles(&self) -> Option<RunFailure> {
        let cause = if self.is_cancelled() {
            FailureCause::Cancelled
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            FailureCause::TimedOut {
                budget: TimeoutBudget::Run,
            }
        } else {
            return None;
        };

        tracing::warn!(
            iteration = self.state.iterations(),
            %cause,
            "Run interrupted between cycles"
        );
        Some(RunFailure {
            cause,
            iteration: self.state.iterations(),
            role: None,
            message: format!("{} before cycle {}", cause, self.state.iterations() + 1),
        })
    }

    async fn cycle(&mut self) -> std::result::Result<(), RunFailure> {
        let iteration = self.state.begin_cycle();
        let started = Instant::now();
        let mut progress = CycleProgress {
            iteration,
            prompt: self.state.prompt().to_string(),
            started_at: Utc::now(),
            started,
            deadline: self.config.per_cycle_timeout.map(|t| started + t),
            generator_output: None,
            critique: None,
            interpreter_extra: Map::new(),
        };
        tracing::debug!(iteration, "Cycle started");

        match self.run_agents(&mut progress).await {
            Ok((generator_output, critique, reflection)) => {
                if reflection.improved_prompt == progress.prompt {
                    tracing::debug!(iteration, "Reflector kept the prompt unchanged");
                }
                let duration_ms = progress.duration_ms();
                self.state.append(IterationRecord::complete(
                    iteration,
                    progress.prompt,
                    generator_output,
                    critique,
                    reflection,
                    progress.started_at,
                    duration_ms,
                )
                .with_interpreter_extra(progress.interpreter_extra));
                self.record_appended().await;
                Ok(())
            }
            Err(interruption) => {
                let duration_ms = progress.duration_ms();
                let failure = RunFailure {
                    cause: interruption.cause,
                    iteration,
                    role: Some(interruption.role),
                    message: interruption.message.clone(),
                };
                self.state.push_partial(IterationRecord::partial(
                    iteration,
                    progress.prompt,
                    progress.generator_output,
                    progress.critique,
                    self.state.confidence(),
                    interruption,
                    progress.started_at,
                    duration_ms,
                )
                .with_interpreter_extra(progress.interpreter_extra));
                self.record_appended().await;
                Err(failure)
            }
        }
    }

    async fn run_agents(
        &mut self,
        progress: &mut CycleProgress,
    ) -> std::result::Result<(GeneratorOutput, Critique, ReflectionResult), Interruption> {
        let question = self.state.question().to_string();
        let prompt = progress.prompt.clone();

        self.enter(Phase::for_role(AgentRole::Generator)).await;
        let input = AgentInput::new()
            .with_question(&question)
            .with_prompt(&prompt);
        let raw = self.invoke(AgentRole::Generator, &input, progress.deadline).await?;
        let generated = GeneratorOutput::from_output(&raw)
            .map_err(|e| agent_interruption(AgentRole::Generator, &e))?;
        progress.generator_output = Some(generated.clone());
        self.check_cancelled(AgentRole::Generator)?;

        self.enter(Phase::for_role(AgentRole::Interpreter)).await;
        let input = AgentInput::new()
            .with_prompt(&prompt)
            .with_thoughts(&generated.thoughts)
            .with_answer(&generated.answer);
        let raw = self.invoke(AgentRole::Interpreter, &input, progress.deadline).await?;
        let critique = Critique::from_output(&raw);
        progress.critique = Some(critique.clone());
        progress.interpreter_extra = raw.extras(AgentRole::Interpreter.output_keys());
        self.check_cancelled(AgentRole::Interpreter)?;

        self.enter(Phase::for_role(AgentRole::Reflector)).await;
        let input = AgentInput::new()
            .with_question(&question)
            .with_prompt(&prompt)
            .with_thoughts(&generated.thoughts)
            .with_answer(&generated.answer)
            .with_critique(critique.as_str());
        let raw = self.invoke(AgentRole::Reflector, &input, progress.deadline).await?;
        let reflection = ReflectionResult::from_output(&raw, &prompt);

        // A cancellation that lands while the reflector runs keeps the
        // completed cycle; the check at the top of the loop stops the run.
        Ok((generated, critique, reflection))
    }

    async fn invoke(
        &self,
        role: AgentRole,
        input: &AgentInput,
        cycle_deadline: Option<Instant>,
    ) -> std::result::Result<AgentOutput, Interruption> {
        let agent = self.agents.get(role);
        let started = Instant::now();

        let result = match self.nearest_deadline(cycle_deadline) {
            Some((deadline, budget)) => {
                match tokio::time::timeout_at(deadline, agent.invoke(input)).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!(
                            %role,
                            agent = agent.name(),
                            %budget,
                            "Agent exceeded its time budget"
                        );
                        return Err(Interruption {
                            cause: FailureCause::TimedOut { budget },
                            role,
                            message: format!(
                                "{} did not return within the {} budget",
                                role, budget
                            ),
                        });
                    }
                }
            }
            None => agent.invoke(input).await,
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(output) => {
                tracing::debug!(
                    %role,
                    agent = agent.name(),
                    duration_ms,
                    keys = output.len(),
                    "Agent returned"
                );
                Ok(output)
            }
            Err(e) => {
                tracing::warn!(
                    %role,
                    agent = agent.name(),
                    kind = %e.kind(),
                    error = %e,
                    duration_ms,
                    "Agent failed"
                );
                Err(agent_interruption(role, &e))
            }
        }
    }

    /// The earlier of the cycle and run deadlines
    fn nearest_deadline(&self, cycle: Option<Instant>) -> Option<(Instant, TimeoutBudget)> {
        match (cycle, self.deadline) {
            (Some(c), Some(r)) if c < r => Some((c, TimeoutBudget::Cycle)),
            (_, Some(r)) => Some((r, TimeoutBudget::Run)),
            (Some(c), None) => Some((c, TimeoutBudget::Cycle)),
            (None, None) => None,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.config
            .cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }

    fn check_cancelled(&self, role: AgentRole) -> std::result::Result<(), Interruption> {
        if !self.is_cancelled() {
            return Ok(());
        }
        tracing::warn!(%role, iteration = self.state.iterations(), "Run cancelled mid-cycle");
        Err(Interruption {
            cause: FailureCause::Cancelled,
            role,
            message: format!("cancelled after {} returned", role),
        })
    }

    async fn enter(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal phase transition {} -> {}",
            self.phase,
            next
        );
        let from = std::mem::replace(&mut self.phase, next);
        tracing::debug!(%from, to = %next, iteration = self.state.iterations(), "Phase transition");
        for observer in self.observers {
            observer.on_phase(self.run_id, from, next).await;
        }
    }

    async fn record_appended(&self) {
        if let Some(record) = self.state.log().last() {
            for observer in self.observers {
                observer.on_record(self.run_id, record).await;
            }
        }
    }

    async fn finish(mut self, cause: StopCause, failure: Option<RunFailure>) -> RunResult {
        self.enter(Phase::stopped(cause)).await;

        let total_duration_ms = self.started.elapsed().as_millis() as u64;
        let last_critique = self.state.last_critique().map(|c| c.to_string());
        let result = RunResult::from_snapshot(
            self.run_id,
            self.state.into_snapshot(),
            cause,
            failure,
            total_duration_ms,
        );

        match &result.failure {
            Some(failure) => tracing::warn!(
                stop_cause = %cause,
                iterations = result.iterations,
                failure = %failure.cause,
                role = failure.role.map(|r| r.as_str()).unwrap_or("none"),
                "Reflection run stopped early"
            ),
            None => tracing::info!(
                stop_cause = %cause,
                iterations = result.iterations,
                final_confidence = result.final_confidence,
                last_critique = last_critique.as_deref().unwrap_or("-"),
                total_duration_ms,
                "Reflection run finished"
            ),
        }

        for observer in self.observers {
            observer.on_stop(self.run_id, &result).await;
        }
        result
    }
}

fn agent_interruption(role: AgentRole, error: &AgentError) -> Interruption {
    Interruption {
        cause: FailureCause::Agent { kind: error.kind() },
        role,
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::agent_fn;
    use std::sync::Mutex;

    fn fixed_agents(confidence: f64) -> ReflectionControllerBuilder {
        ReflectionController::builder()
            .generator(agent_fn("gen", |_| async {
                Ok(AgentOutput::new().with("thoughts", "t").with("answer", "a"))
            }))
            .interpreter(agent_fn("critic", |_| async {
                Ok(AgentOutput::new().with("critique", ""))
            }))
            .reflector(agent_fn("reflect", move |input: AgentInput| async move {
                Ok(AgentOutput::new()
                    .with("improved_prompt", format!("{}!", input.prompt))
                    .with("confidence", confidence))
            }))
    }

    #[derive(Default)]
    struct PhaseRecorder {
        phases: Mutex<Vec<Phase>>,
        stops: Mutex<usize>,
    }

    #[async_trait::async_trait]
    impl RunObserver for PhaseRecorder {
        async fn on_phase(&self, _run_id: Uuid, _from: Phase, to: Phase) {
            self.phases.lock().unwrap().push(to);
        }

        async fn on_stop(&self, _run_id: Uuid, _result: &RunResult) {
            *self.stops.lock().unwrap() += 1;
        }
    }

    #[test]
    fn test_validate_inputs() {
        assert!(validate_inputs("q", "p").is_ok());
        assert!(validate_inputs("  ", "p").unwrap_err().is_validation());
        assert!(validate_inputs("q", "").unwrap_err().is_validation());
    }

    #[test]
    fn test_build_requires_all_roles() {
        let err = ReflectionController::builder()
            .generator(agent_fn("gen", |_| async { Ok(AgentOutput::new()) }))
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_build_rejects_bad_threshold() {
        let err = fixed_agents(0.5)
            .confidence_threshold(1.5)
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_critique_normalized_and_prompt_advances() {
        let controller = fixed_agents(0.5).max_iterations(2).build().unwrap();
        let result = controller.run("q", "p").await.unwrap();

        assert_eq!(result.stop_cause, StopCause::Exhausted);
        assert_eq!(result.final_prompt, "p!!");
        assert!(result.log[0].critique.as_ref().unwrap().is_no_issues());
        assert_eq!(result.log[1].prompt_at_entry, "p!");
    }

    #[tokio::test]
    async fn test_observer_sees_phases() {
        let recorder = Arc::new(PhaseRecorder::default());
        let controller = fixed_agents(0.9)
            .observer(recorder.clone())
            .build()
            .unwrap();

        let result = controller.run("q", "p").await.unwrap();
        assert_eq!(result.stop_cause, StopCause::Converged);
        assert_eq!(
            *recorder.phases.lock().unwrap(),
            vec![
                Phase::Generating,
                Phase::Critiquing,
                Phase::Reflecting,
                Phase::StoppedConverged
            ]
        );
        assert_eq!(*recorder.stops.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_overrides_are_validated() {
        let controller = fixed_agents(0.9).build().unwrap();
        let err = controller
            .run_with("q", "p", RunOverrides::new().confidence_threshold(0.0))
            .await
            .unwrap_err();
        assert!(err.is_configuration());

        let result = controller
            .run_with("q", "p", RunOverrides::new().max_iterations(0))
            .await
            .unwrap();
        assert_eq!(result.iterations, 0);
    }

    #[tokio::test]
    async fn test_nearest_deadline() {
        let controller = fixed_agents(0.9).build().unwrap();
        let config = ControllerConfig::default().with_run_timeout(Duration::from_secs(10));
        let run = Run::new(&controller, config, Uuid::new_v4(), "q", "p");

        let soon = run.started + Duration::from_secs(1);
        let late = run.started + Duration::from_secs(20);
        assert_eq!(run.nearest_deadline(Some(soon)), Some((soon, TimeoutBudget::Cycle)));
        assert_eq!(
            run.nearest_deadline(Some(late)).map(|(_, b)| b),
            Some(TimeoutBudget::Run)
        );
        assert_eq!(run.nearest_deadline(None).map(|(_, b)| b), Some(TimeoutBudget::Run));
    }
}
