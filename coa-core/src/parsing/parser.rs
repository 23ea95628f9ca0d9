//! The [`OutputParser`] seam shared by the JSON and section parsers

use serde_json::{Map, Value};
use thiserror::Error;

/// Why a model reply could not be turned into a key/value bundle
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Nothing but whitespace came back
    #[error("model output was empty")]
    Empty,

    /// The reply does not have the expected shape
    #[error("output is not in the expected shape: {0}")]
    Unparseable(String),

    /// Repair ran and the result still did not parse
    #[error("repair did not produce usable output: {0}")]
    Unrepairable(String),
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Turns raw model text into a key/value bundle
pub trait OutputParser: Send + Sync {
    fn parse(&self, raw: &str) -> ParseResult<Map<String, Value>>;

    /// Short label used in log lines
    fn name(&self) -> &'static str;
}

/// Knobs for the lenient parsing path
///
/// The default strips markdown fences and tries to repair near-JSON
/// (single quotes, trailing commas, unquoted keys).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfig {
    pub repair: bool,
    pub strip_fences: bool,
}

impl ParserConfig {
    pub const fn lenient() -> Self {
        Self {
            repair: true,
            strip_fences: true,
        }
    }

    /// Fences are still stripped, but malformed output stays malformed
    pub const fn strict() -> Self {
        Self {
            repair: false,
            strip_fences: true,
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self::lenient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_only_disables_repair() {
        let strict = ParserConfig::strict();
        assert!(!strict.repair);
        assert_eq!(strict.strip_fences, ParserConfig::default().strip_fences);
    }
}
