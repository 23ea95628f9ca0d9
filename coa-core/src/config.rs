//! Configuration for reflection runs
//!
//! [`ControllerConfig`] holds the per-run knobs: iteration ceiling,
//! confidence threshold, wall-clock budgets and an optional cancellation
//! token. [`CoaConfig`] bundles it with the agent [`RetryConfig`] and knows
//! how to load both from TOML files and `COA_`-prefixed environment
//! variables.
//!
//! ```toml
//! [controller]
//! max_iterations = 3
//! confidence_threshold = 0.9
//! per_cycle_timeout = "30s"
//! run_timeout = "2m"
//!
//! [retry]
//! max_attempts = 4
//! initial_delay = "250ms"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::agent::RetryConfig;
use crate::error::{CoaError, Result};

/// Default iteration ceiling
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// Default confidence threshold
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.85;

/// Controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Maximum number of cycles. Zero is legal and runs no cycle.
    pub max_iterations: usize,

    /// Stop once the reflector's confidence reaches this value, in `(0, 1]`
    pub confidence_threshold: f64,

    /// Wall-clock budget for one Generator → Interpreter → Reflector cycle
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub per_cycle_timeout: Option<Duration>,

    /// Wall-clock budget for the whole run
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub run_timeout: Option<Duration>,

    /// Caller-owned cancellation signal
    #[serde(skip)]
    pub cancellation: Option<CancellationToken>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            per_cycle_timeout: None,
            run_timeout: None,
            cancellation: None,
        }
    }
}

impl ControllerConfig {
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_per_cycle_timeout(mut self, timeout: Duration) -> Self {
        self.per_cycle_timeout = Some(timeout);
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Copy of this config with per-run overrides applied
    pub fn with_overrides(&self, overrides: &RunOverrides) -> Self {
        let mut config = self.clone();
        if let Some(max) = overrides.max_iterations {
            config.max_iterations = max;
        }
        if let Some(threshold) = overrides.confidence_threshold {
            config.confidence_threshold = threshold;
        }
        config
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the threshold lies outside `(0, 1]`
    /// or a timeout is zero.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.confidence_threshold;
        if !threshold.is_finite() || threshold <= 0.0 || threshold > 1.0 {
            return Err(CoaError::Configuration(format!(
                "confidence_threshold must be in (0.0, 1.0], got {}",
                threshold
            )));
        }

        for (name, timeout) in [
            ("per_cycle_timeout", self.per_cycle_timeout),
            ("run_timeout", self.run_timeout),
        ] {
            if timeout.is_some_and(|t| t.is_zero()) {
                return Err(CoaError::Configuration(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// Per-run overrides for [`ControllerConfig`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOverrides {
    pub max_iterations: Option<usize>,
    pub confidence_threshold: Option<f64>,
}

impl RunOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = Some(max);
        self
    }

    pub fn confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = Some(threshold);
        self
    }
}

/// Top-level configuration file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoaConfig {
    pub controller: ControllerConfig,
    pub retry: RetryConfig,
}

impl CoaConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. `coa.toml` in the working directory
    /// 3. The file named by `COA_CONFIG_PATH`
    /// 4. `COA_`-prefixed environment variables, nested with `__`
    ///    (`COA_CONTROLLER__MAX_ITERATIONS=3`)
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a file is invalid or the merged
    /// values fail validation.
    pub fn load() -> Result<Self> {
        use figment::{
            providers::{Env, Format, Toml},
            Figment,
        };

        let mut figment = Figment::new().merge(Toml::file("coa.toml"));

        if let Ok(path) = std::env::var("COA_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        let config: CoaConfig = figment
            .merge(Env::prefixed("COA_").ignore(&["CONFIG_PATH"]).split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or fails
    /// validation.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Toml},
        };

        let path = path.as_ref();
        if !path.exists() {
            return Err(CoaError::Configuration(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }

        let config: CoaConfig = Figment::new().merge(Toml::file(path)).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Toml},
        };

        let config: CoaConfig = Figment::new().merge(Toml::string(toml)).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate both sections.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        self.controller.validate()?;

        if self.retry.max_attempts == 0 {
            return Err(CoaError::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(CoaError::Configuration(format!(
                "retry.backoff_multiplier must be >= 1.0, got {}",
                self.retry.backoff_multiplier
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.confidence_threshold, 0.85);
        assert!(config.per_cycle_timeout.is_none());
        assert!(config.cancellation.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_threshold_validation() {
        for bad in [0.0, -0.1, 1.01, f64::NAN] {
            let err = ControllerConfig::default()
                .with_confidence_threshold(bad)
                .validate()
                .unwrap_err();
            assert!(err.is_configuration(), "threshold {} accepted", bad);
        }
        assert!(
            ControllerConfig::default()
                .with_confidence_threshold(1.0)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_zero_iterations_is_legal() {
        assert!(ControllerConfig::default().with_max_iterations(0).validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = ControllerConfig::default()
            .with_run_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("run_timeout"));
    }

    #[test]
    fn test_overrides() {
        let base = ControllerConfig::default().with_per_cycle_timeout(Duration::from_secs(5));
        let config = base.with_overrides(&RunOverrides::new().max_iterations(2));
        assert_eq!(config.max_iterations, 2);
        assert_eq!(config.confidence_threshold, 0.85);
        assert_eq!(config.per_cycle_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_from_toml_str() {
        let config = CoaConfig::from_toml_str(
            r#"
            [controller]
            max_iterations = 3
            confidence_threshold = 0.9
            per_cycle_timeout = "30s"

            [retry]
            max_attempts = 4
            initial_delay = "250ms"
            "#,
        )
        .unwrap();

        assert_eq!(config.controller.max_iterations, 3);
        assert_eq!(config.controller.confidence_threshold, 0.9);
        assert_eq!(config.controller.per_cycle_timeout, Some(Duration::from_secs(30)));
        assert!(config.controller.run_timeout.is_none());
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(250));
        assert_eq!(config.retry.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_toml_values() {
        let err = CoaConfig::from_toml_str("[controller]\nconfidence_threshold = 1.5").unwrap_err();
        assert!(err.is_configuration());

        let err = CoaConfig::from_toml_str("[controller]\nmax_iterations = -1").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[controller]\nrun_timeout = \"2m\"").unwrap();

        let config = CoaConfig::from_file(file.path()).unwrap();
        assert_eq!(config.controller.run_timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.controller.max_iterations, DEFAULT_MAX_ITERATIONS);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CoaConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(err.is_configuration());
    }
}
