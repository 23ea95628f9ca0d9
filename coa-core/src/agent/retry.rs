//! Retry wrapper for agents
//!
//! The controller never retries. Agents that talk to flaky backends wrap
//! themselves in [`RetryingAgent`], which retries transient failures with
//! exponential backoff and jitter before surfacing the last error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::{AgentError, AgentErrorKind};
use super::port::{AgentInput, AgentOutput, AgentPort};

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first call
    pub max_attempts: usize,
    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Add up to 25% jitter to each delay
    pub add_jitter: bool,
    /// Also retry malformed output (re-asking an LLM often fixes it)
    pub retry_malformed: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
            retry_malformed: false,
        }
    }
}

impl RetryConfig {
    /// Create a config with no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Builder: set max attempts
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Builder: set initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Builder: set max delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Builder: set backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    /// Builder: enable/disable jitter
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Builder: retry malformed output too
    pub fn with_retry_malformed(mut self, retry: bool) -> Self {
        self.retry_malformed = retry;
        self
    }

    /// Calculate delay for a given retry (0-indexed)
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let base = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt.min(i32::MAX as usize) as i32);
        let clamped = base.min(self.max_delay.as_millis() as f64);

        let delay = if self.add_jitter {
            clamped + clamped * 0.25 * jitter_fraction()
        } else {
            clamped
        };

        Duration::from_millis(delay as u64)
    }

    /// Whether an error of this kind should be retried under this config
    pub fn should_retry(&self, kind: AgentErrorKind) -> bool {
        match kind {
            AgentErrorKind::Transient => true,
            AgentErrorKind::Malformed => self.retry_malformed,
            AgentErrorKind::Permanent => false,
        }
    }
}

/// Pseudo-random fraction in [0, 1) from the clock and a counter
fn jitter_fraction() -> f64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    const A: u64 = 6364136223846793005;
    const C: u64 = 1442695040888963407;

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    let seed = COUNTER.fetch_add(1, Ordering::Relaxed).wrapping_add(nanos);
    let next = A.wrapping_mul(seed).wrapping_add(C);

    (next >> 11) as f64 / (1u64 << 53) as f64
}

/// Execute an async operation, retrying while `should_retry` approves the
/// error and attempts remain.
pub async fn with_retry_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts || !should_retry(&e) {
                    return Err(e);
                }

                let delay = config.delay_for_attempt(attempt - 1);
                tracing::debug!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after failure"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Agent wrapper that retries transient failures
#[derive(Debug, Clone)]
pub struct RetryingAgent<A> {
    inner: A,
    config: RetryConfig,
}

impl<A: AgentPort> RetryingAgent<A> {
    pub fn new(inner: A, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: AgentPort> AgentPort for RetryingAgent<A> {
    async fn invoke(&self, input: &AgentInput) -> Result<AgentOutput, AgentError> {
        with_retry_if(
            &self.config,
            || self.inner.invoke(input),
            |e: &AgentError| self.config.should_retry(e.kind()),
        )
        .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
