//! JSON object parser with optional repair

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

use super::parser::{OutputParser, ParseError, ParseResult, ParserConfig};

static CODE_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json|JSON)?\s*\n?([\s\S]*?)\n?```").expect("valid regex"));
static TRAILING_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").expect("valid regex"));
static UNQUOTED_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\{|,)\s*([A-Za-z_][A-Za-z0-9_]*)\s*:").expect("valid regex")
});
static LINE_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*//[^\n]*").expect("valid regex"));
static BLOCK_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\*[\s\S]*?\*/").expect("valid regex"));

/// Parses a JSON object out of model output.
///
/// Model output often wraps the object in prose or a fenced block, and
/// sometimes breaks JSON syntax. With repair enabled the parser fixes
/// trailing commas, single quotes, unquoted keys, comments and missing
/// closing braces.
#[derive(Debug, Clone, Default)]
pub struct JsonParser {
    config: ParserConfig,
}

impl JsonParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parser that only strips fences and extracts, never repairs
    pub fn strict() -> Self {
        Self::with_config(ParserConfig::strict())
    }

    pub fn repairs(&self) -> bool {
        self.config.repair
    }

    fn parse_object(text: &str) -> Option<Map<String, Value>> {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    fn candidates(&self, raw: &str) -> Vec<String> {
        let trimmed = raw.trim();
        let mut out = Vec::with_capacity(3);

        if self.config.strip_fences {
            if let Some(inner) = CODE_FENCE_RE
                .captures(trimmed)
                .and_then(|caps| caps.get(1))
            {
                out.push(inner.as_str().trim().to_string());
            }
        }
        out.push(trimmed.to_string());
        if let Some(object) = extract_object(trimmed) {
            out.push(object.to_string());
        }
        out
    }
}

impl OutputParser for JsonParser {
    fn parse(&self, raw: &str) -> ParseResult<Map<String, Value>> {
        if raw.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let candidates = self.candidates(raw);
        if let Some(map) = candidates.iter().find_map(|c| Self::parse_object(c)) {
            return Ok(map);
        }

        if !self.config.repair {
            return Err(ParseError::Unparseable(
                "output does not contain a JSON object".to_string(),
            ));
        }

        candidates
            .iter()
            .find_map(|c| Self::parse_object(&repair(c)))
            .ok_or_else(|| {
                ParseError::Unrepairable("no JSON object survived repair".to_string())
            })
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// Slice from the first `{` to its balanced closing brace
fn extract_object(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let body = &input[start..];
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&body[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn repair(input: &str) -> String {
    let text = BLOCK_COMMENT_RE.replace_all(input, "");
    let text = LINE_COMMENT_RE.replace_all(&text, "");
    let text = single_to_double_quotes(&text);
    let text = UNQUOTED_KEY_RE.replace_all(&text, r#"$1"$2":"#);
    let mut text = TRAILING_COMMA_RE.replace_all(&text, "$1").into_owned();

    let open = text.matches('{').count();
    let close = text.matches('}').count();
    for _ in close..open {
        text.push('}');
    }
    text
}

fn single_to_double_quotes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_double = false;
    let mut in_single = false;
    let mut escaped = false;

    for c in input.chars() {
        if escaped {
            out.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                out.push(c);
                escaped = true;
            }
            '"' if in_single => out.push_str("\\\""),
            '"' => {
                in_double = !in_double;
                out.push(c);
            }
            '\'' if !in_double => {
                in_single = !in_single;
                out.push('"');
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_object() {
        let map = JsonParser::new().parse(r#"{"answer": "4"}"#).unwrap();
        assert_eq!(map["answer"], "4");
    }

    #[test]
    fn test_parse_fenced_block() {
        let raw = "Here you go:\n```json\n{\"critique\": \"no_issues_found\"}\n```";
        let map = JsonParser::new().parse(raw).unwrap();
        assert_eq!(map["critique"], "no_issues_found");
    }

    #[test]
    fn test_parse_object_in_prose() {
        let raw =
            r#"My reflection is {"improved_prompt": "Be exact.", "confidence": 0.8} as requested."#;
        let map = JsonParser::strict().parse(raw).unwrap();
        assert_eq!(map["confidence"], 0.8);
    }

    #[test]
    fn test_repair_trailing_comma_and_quotes() {
        let map = JsonParser::new()
            .parse(r#"{'answer': '4', thoughts: "easy",}"#)
            .unwrap();
        assert_eq!(map["answer"], "4");
        assert_eq!(map["thoughts"], "easy");
    }

    #[test]
    fn test_repair_comments_and_missing_brace() {
        let raw = "{\n  // model chatter\n  \"answer\": \"4\"";
        let map = JsonParser::new().parse(raw).unwrap();
        assert_eq!(map["answer"], "4");
    }

    #[test]
    fn test_strict_rejects_broken_json() {
        let err = JsonParser::strict().parse(r#"{"answer": "4",}"#).unwrap_err();
        assert!(matches!(err, ParseError::Unparseable(_)));
    }

    #[test]
    fn test_arrays_are_not_objects() {
        assert!(JsonParser::new().parse("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(JsonParser::new().parse("   "), Err(ParseError::Empty));
    }
}
