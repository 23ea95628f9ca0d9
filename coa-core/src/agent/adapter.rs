//! Adapters that turn arbitrary callables into agents
//!
//! Two adapters cover the common cases:
//!
//! - [`agent_fn`] wraps an async closure. Tests and hand-written agents use it.
//! - [`llm_agent`] wraps an [`LLMProvider`]: it renders a role template from
//!   the input bundle, calls the model, parses the reply and classifies
//!   failures into [`AgentErrorKind`](super::AgentErrorKind)s.

use async_trait::async_trait;
use std::future::Future;
use std::time::Instant;

use crate::llm::{LLMProvider, LLMRequest, ProviderError};
use crate::parsing::{JsonParser, OutputParser, ParseError, ParserConfig, SectionParser};

use super::error::AgentError;
use super::port::{keys, AgentInput, AgentOutput, AgentPort, AgentRole};

/// Agent backed by an async closure
pub struct FnAgent<F> {
    name: String,
    func: F,
}

impl<F> std::fmt::Debug for FnAgent<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnAgent").field("name", &self.name).finish()
    }
}

/// Adapt an async closure into an agent.
///
/// The closure receives an owned copy of the input bundle.
///
/// ```rust
/// use coa_core::agent::{agent_fn, AgentOutput};
///
/// let generator = agent_fn("arith", |input| async move {
///     let answer = if input.question.contains("2+2") { "4" } else { "unknown" };
///     Ok(AgentOutput::new().with("thoughts", "lookup").with("answer", answer))
/// });
/// ```
pub fn agent_fn<F, Fut>(name: impl Into<String>, func: F) -> FnAgent<F>
where
    F: Fn(AgentInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<AgentOutput, AgentError>> + Send,
{
    FnAgent {
        name: name.into(),
        func,
    }
}

#[async_trait]
impl<F, Fut> AgentPort for FnAgent<F>
where
    F: Fn(AgentInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<AgentOutput, AgentError>> + Send,
{
    async fn invoke(&self, input: &AgentInput) -> Result<AgentOutput, AgentError> {
        (self.func)(input.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// How an [`LlmAgent`] reads the model reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    /// A JSON object, possibly fenced or embedded in prose
    Json,
    /// `Label: value` sections named after the role's output keys
    Sections,
    /// The whole reply becomes the value of one key
    Text { key: String },
}

const GENERATOR_SYSTEM: &str = "{{prompt}}\n\n\
Think step by step, then reply with a JSON object with two string fields: \
\"thoughts\" (your reasoning) and \"answer\" (the final answer).";

const GENERATOR_USER: &str = "{{question}}";

const INTERPRETER_SYSTEM: &str = "You review another model's reasoning. \
Name its defects using tags such as invalid_assumption or \
missing_verification_step, followed by a short explanation. If the answer is \
sound, reply with no_issues_found. Reply with a JSON object with one string \
field: \"critique\".";

const INTERPRETER_USER: &str = "Instruction given to the model:\n{{prompt}}\n\n\
Reasoning:\n{{thoughts}}\n\nAnswer:\n{{answer}}";

const REFLECTOR_SYSTEM: &str = "You improve instructions for another model. \
Rewrite the instruction so the critique is addressed next time, and estimate \
how likely the current answer is correct. Reply with a JSON object with \
fields \"improved_prompt\" (string), \"confidence\" (number between 0 and 1) \
and \"changes\" (list of strings describing your edits).";

const REFLECTOR_USER: &str = "Question:\n{{question}}\n\n\
Current instruction:\n{{prompt}}\n\nReasoning:\n{{thoughts}}\n\n\
Answer:\n{{answer}}\n\nCritique:\n{{critique}}";

/// Render `{{key}}` placeholders from the input bundle.
///
/// Unknown placeholders are left as-is.
pub fn render_template(template: &str, input: &AgentInput) -> String {
    input
        .entries()
        .iter()
        .fold(template.to_string(), |text, (key, value)| {
            text.replace(&format!("{{{{{}}}}}", key), value)
        })
}

/// Agent backed by an LLM provider
pub struct LlmAgent<P> {
    provider: P,
    role: AgentRole,
    name: String,
    system_template: String,
    user_template: String,
    format: OutputFormat,
    parser_config: ParserConfig,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
}

/// Adapt an LLM provider into an agent for `role`, with the role's default
/// templates and JSON output.
pub fn llm_agent<P: LLMProvider>(provider: P, role: AgentRole) -> LlmAgent<P> {
    let (system, user) = match role {
        AgentRole::Generator => (GENERATOR_SYSTEM, GENERATOR_USER),
        AgentRole::Interpreter => (INTERPRETER_SYSTEM, INTERPRETER_USER),
        AgentRole::Reflector => (REFLECTOR_SYSTEM, REFLECTOR_USER),
    };
    LlmAgent {
        provider,
        role,
        name: format!("llm-{}", role),
        system_template: system.to_string(),
        user_template: user.to_string(),
        format: OutputFormat::Json,
        parser_config: ParserConfig::default(),
        temperature: None,
        max_tokens: None,
    }
}

impl<P: LLMProvider> LlmAgent<P> {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn system_template(mut self, template: impl Into<String>) -> Self {
        self.system_template = template.into();
        self
    }

    pub fn user_template(mut self, template: impl Into<String>) -> Self {
        self.user_template = template.into();
        self
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Toggle JSON repair; without it unparseable replies are malformed
    pub fn repair(mut self, enabled: bool) -> Self {
        self.parser_config.repair = enabled;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    /// Build the provider request for an input bundle
    pub fn build_request(&self, input: &AgentInput) -> LLMRequest {
        let system = render_template(&self.system_template, input);
        let user = render_template(&self.user_template, input);
        let mut request = if system.trim().is_empty() {
            LLMRequest::from_prompt(user)
        } else {
            LLMRequest::with_system_prompt(system, user)
        };
        if let Some(temperature) = self.temperature {
            request = request.temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            request = request.max_tokens(max_tokens);
        }
        request
    }

    /// Parse a raw reply into the role's output bundle
    pub fn parse_reply(&self, content: &str) -> Result<AgentOutput, AgentError> {
        let (parser, parsed) = match &self.format {
            OutputFormat::Json => {
                let parser = JsonParser::with_config(self.parser_config);
                (parser.name(), parser.parse(content))
            }
            OutputFormat::Sections => {
                let parser = SectionParser::new(self.role.output_keys().iter().copied());
                (parser.name(), parser.parse(content))
            }
            OutputFormat::Text { key } => {
                let text = content.trim();
                let parsed = if text.is_empty() {
                    Err(ParseError::Empty)
                } else {
                    let mut map = serde_json::Map::new();
                    map.insert(key.clone(), text.into());
                    Ok(map)
                };
                ("text", parsed)
            }
        };

        let output = parsed.map(AgentOutput::from).map_err(|e| {
            AgentError::malformed(format!(
                "{} reply could not be parsed as {}: {}",
                self.role, parser, e
            ))
            .with_source(e)
        })?;

        if self.role == AgentRole::Generator && !output.contains_key(keys::ANSWER) {
            return Err(AgentError::missing_key(self.role, keys::ANSWER));
        }
        Ok(output)
    }
}

fn classify(error: ProviderError) -> AgentError {
    let message = error.to_string();
    let classified = if error.is_transient() {
        AgentError::transient(message)
    } else {
        AgentError::permanent(message)
    };
    classified.with_source(error)
}

#[async_trait]
impl<P: LLMProvider> AgentPort for LlmAgent<P> {
    async fn invoke(&self, input: &AgentInput) -> Result<AgentOutput, AgentError> {
        let request = self.build_request(input);
        let started = Instant::now();

        let response = self
            .provider
            .generate_request(&request)
            .await
            .map_err(classify)?;

        tracing::debug!(
            agent = %self.name,
            role = %self.role,
            model = self.provider.model_name(),
            duration_ms = started.elapsed().as_millis() as u64,
            reply_len = response.content.len(),
            "LLM call completed"
        );

        let mut output = self.parse_reply(&response.content)?;
        if let Some(usage) = response.usage {
            output.insert("prompt_tokens", usage.prompt_tokens);
            output.insert("completion_tokens", usage.completion_tokens);
            output.insert("total_tokens", usage.total_tokens);
        }
        Ok(output)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
