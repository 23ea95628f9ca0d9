//! Structured output parsing
//!
//! Robust parsing of LLM replies into agent output bundles.
//!
//! - **JSON**: fenced blocks, objects embedded in prose, fuzzy repair
//! - **Sections**: `Label: value` free text
//!
//! # Example
//!
//! ```rust
//! use coa_core::parsing::{JsonParser, OutputParser};
//!
//! let parser = JsonParser::new();
//! let map = parser.parse("```json\n{\"answer\": \"4\",}\n```").unwrap();
//! assert_eq!(map["answer"], "4");
//! ```

mod json;
mod parser;
mod sections;

pub use json::JsonParser;
pub use parser::{OutputParser, ParseError, ParseResult, ParserConfig};
pub use sections::SectionParser;
