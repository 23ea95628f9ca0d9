//! Error types for reflection runs
//!
//! `CoaError` covers programmer errors (bad configuration, invalid inputs)
//! that are rejected before any agent is called. Failures that happen while
//! agents run are reported as data on [`crate::controller::RunResult`].

/// Result type for coa operations
pub type Result<T> = std::result::Result<T, CoaError>;

/// Error types for the reflection controller
#[derive(Debug, thiserror::Error)]
pub enum CoaError {
    /// Configuration error (missing role, threshold out of range, ...)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid run input (empty question or prompt)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl CoaError {
    /// Whether this error was raised by configuration checks
    pub fn is_configuration(&self) -> bool {
        matches!(self, CoaError::Configuration(_))
    }

    /// Whether this error was raised by input validation
    pub fn is_validation(&self) -> bool {
        matches!(self, CoaError::Validation(_))
    }
}

impl From<String> for CoaError {
    fn from(s: String) -> Self {
        CoaError::Other(s)
    }
}

impl From<&str> for CoaError {
    fn from(s: &str) -> Self {
        CoaError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for CoaError {
    fn from(err: anyhow::Error) -> Self {
        CoaError::Other(err.to_string())
    }
}

impl From<figment::Error> for CoaError {
    fn from(err: figment::Error) -> Self {
        CoaError::Configuration(format!("Failed to load configuration: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoaError::Configuration("missing role 'reflector'".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: missing role 'reflector'"
        );
        assert!(err.is_configuration());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_from_conversions() {
        let err: CoaError = "boom".into();
        assert!(matches!(err, CoaError::Other(ref m) if m == "boom"));

        let err: CoaError = anyhow::anyhow!("wrapped").into();
        assert_eq!(err.to_string(), "wrapped");

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: CoaError = json_err.into();
        assert!(matches!(err, CoaError::Serialization(_)));
    }
}
