//! Labelled-section parser for free-text model output
//!
//! Handles replies shaped like
//!
//! ```text
//! Thoughts: the sum of two and two
//! Answer: 4
//! ```
//!
//! Labels are matched case-insensitively at the start of a line, optionally
//! prefixed by markdown heading or bold markers. A section runs until the
//! next known label.

use regex::Regex;
use serde_json::{Map, Value};

use super::parser::{OutputParser, ParseError, ParseResult};

/// Parser for `Label: value` sections
#[derive(Debug, Clone)]
pub struct SectionParser {
    labels: Vec<String>,
    pattern: Regex,
}

impl SectionParser {
    /// Create a parser for the given labels (output keys).
    ///
    /// Underscores in a label also match spaces, so `improved_prompt`
    /// accepts `Improved Prompt:`.
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        let alternatives = labels
            .iter()
            .map(|label| regex::escape(label).replace('_', "[ _]"))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(
            r"(?im)^[ \t]*(?:#+[ \t]*)?(?:\*\*)?({})(?:\*\*)?[ \t]*:(?:\*\*)?",
            alternatives
        ))
        .expect("escaped labels form a valid regex");

        Self { labels, pattern }
    }

    fn key_for(&self, matched: &str) -> Option<&str> {
        let normalized = matched.to_lowercase().replace(' ', "_");
        self.labels
            .iter()
            .find(|label| label.to_lowercase() == normalized)
            .map(String::as_str)
    }
}

impl OutputParser for SectionParser {
    fn parse(&self, raw: &str) -> ParseResult<Map<String, Value>> {
        if raw.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let mut map = Map::new();
        let matches: Vec<_> = self.pattern.captures_iter(raw).collect();

        for (i, caps) in matches.iter().enumerate() {
            let (Some(whole), Some(label)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let end = matches
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(raw.len());
            let value = raw[whole.end()..end].trim();

            if let Some(key) = self.key_for(label.as_str()) {
                map.entry(key.to_string())
                    .or_insert_with(|| Value::String(value.to_string()));
            }
        }

        if map.is_empty() {
            return Err(ParseError::Unparseable(format!(
                "none of the labels [{}] were found",
                self.labels.join(", ")
            )));
        }
        Ok(map)
    }

    fn name(&self) -> &'static str {
        "sections"
    }
}
