//! Agent failure taxonomy

use serde::{Deserialize, Serialize};
use std::fmt;

use super::port::AgentRole;

/// Error kind taxonomy for agent invocations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentErrorKind {
    /// Safe to retry (rate limits, network blips, timeouts)
    Transient,

    /// Abort the run
    Permanent,

    /// Output could not be parsed or lacks a required key
    Malformed,
}

impl AgentErrorKind {
    /// Returns the kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentErrorKind::Transient => "transient",
            AgentErrorKind::Permanent => "permanent",
            AgentErrorKind::Malformed => "malformed",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentErrorKind::Transient)
    }
}

impl fmt::Display for AgentErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by an [`AgentPort`](super::AgentPort) invocation.
///
/// The controller never retries: whatever kind reaches it ends the run with
/// `StopCause::Failed`. Retrying transient failures is the job of the agent
/// itself, e.g. by wrapping it in [`RetryingAgent`](super::RetryingAgent).
#[derive(Debug, thiserror::Error)]
#[error("{kind} agent error: {message}")]
pub struct AgentError {
    kind: AgentErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl AgentError {
    /// Create a new error with the given kind and message
    pub fn new(kind: AgentErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a transient (retryable) error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Transient, message)
    }

    /// Create a permanent error
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Permanent, message)
    }

    /// Create a malformed-output error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(AgentErrorKind::Malformed, message)
    }

    /// A required output key was missing after normalization
    pub fn missing_key(role: AgentRole, key: &str) -> Self {
        Self::malformed(format!("{} output is missing required key '{}'", role, key))
    }

    /// Attach the underlying error
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> AgentErrorKind {
        self.kind
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_retryable() {
        assert!(AgentErrorKind::Transient.is_retryable());
        assert!(!AgentErrorKind::Permanent.is_retryable());
        assert!(!AgentErrorKind::Malformed.is_retryable());
    }

    #[test]
    fn test_display() {
        let err = AgentError::transient("rate limited");
        assert_eq!(err.to_string(), "transient agent error: rate limited");

        let err = AgentError::missing_key(AgentRole::Generator, "answer");
        assert_eq!(err.kind(), AgentErrorKind::Malformed);
        assert!(err.message().contains("generator"));
        assert!(err.message().contains("'answer'"));
    }

    #[test]
    fn test_source_is_preserved() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = AgentError::transient("network").with_source(io);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_kind_serde() {
        let json = serde_json::to_string(&AgentErrorKind::Malformed).unwrap();
        assert_eq!(json, "\"malformed\"");
    }
}
