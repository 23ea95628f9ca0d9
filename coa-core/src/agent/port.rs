//! The Agent Port: one async call from a keyword bundle to a keyword bundle

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{CoaError, Result};

use super::error::AgentError;

/// Well-known bundle keys
pub mod keys {
    pub const QUESTION: &str = "question";
    pub const PROMPT: &str = "prompt";
    pub const THOUGHTS: &str = "thoughts";
    pub const ANSWER: &str = "answer";
    pub const CRITIQUE: &str = "critique";
    pub const IMPROVED_PROMPT: &str = "improved_prompt";
    pub const CONFIDENCE: &str = "confidence";
    pub const CHANGES: &str = "changes";
}

/// The three roles the controller drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Proposes an answer and its reasoning trace
    Generator,
    /// Critiques the generator output
    Interpreter,
    /// Rewrites the controlling prompt and reports a confidence
    Reflector,
}

impl AgentRole {
    /// All roles in invocation order
    pub const ALL: [AgentRole; 3] = [
        AgentRole::Generator,
        AgentRole::Interpreter,
        AgentRole::Reflector,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Generator => "generator",
            AgentRole::Interpreter => "interpreter",
            AgentRole::Reflector => "reflector",
        }
    }

    /// Output keys the controller reads for this role
    pub fn output_keys(&self) -> &'static [&'static str] {
        match self {
            AgentRole::Generator => &[keys::THOUGHTS, keys::ANSWER],
            AgentRole::Interpreter => &[keys::CRITIQUE],
            AgentRole::Reflector => &[keys::IMPROVED_PROMPT, keys::CONFIDENCE, keys::CHANGES],
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = CoaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "generator" => Ok(AgentRole::Generator),
            // The critic role goes by both names.
            "interpreter" | "introspector" => Ok(AgentRole::Interpreter),
            "reflector" => Ok(AgentRole::Reflector),
            other => Err(CoaError::Configuration(format!(
                "unknown agent role '{}'",
                other
            ))),
        }
    }
}

/// Input bundle handed to an agent.
///
/// Only the well-known keys exist. Keys a role does not receive are empty
/// strings, and lookups of unknown keys also yield `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInput {
    pub question: String,
    pub prompt: String,
    pub thoughts: String,
    pub answer: String,
    pub critique: String,
}

impl AgentInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from arbitrary key/value pairs, ignoring unknown keys
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut input = Self::default();
        for (key, value) in pairs {
            match key.as_ref() {
                keys::QUESTION => input.question = value.into(),
                keys::PROMPT => input.prompt = value.into(),
                keys::THOUGHTS => input.thoughts = value.into(),
                keys::ANSWER => input.answer = value.into(),
                keys::CRITIQUE => input.critique = value.into(),
                _ => {}
            }
        }
        input
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = question.into();
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_thoughts(mut self, thoughts: impl Into<String>) -> Self {
        self.thoughts = thoughts.into();
        self
    }

    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = answer.into();
        self
    }

    pub fn with_critique(mut self, critique: impl Into<String>) -> Self {
        self.critique = critique.into();
        self
    }

    /// Look up a key; unknown keys read as empty
    pub fn get(&self, key: &str) -> &str {
        match key {
            keys::QUESTION => &self.question,
            keys::PROMPT => &self.prompt,
            keys::THOUGHTS => &self.thoughts,
            keys::ANSWER => &self.answer,
            keys::CRITIQUE => &self.critique,
            _ => "",
        }
    }

    /// All keys with their values, in a fixed order
    pub fn entries(&self) -> [(&'static str, &str); 5] {
        [
            (keys::QUESTION, self.question.as_str()),
            (keys::PROMPT, self.prompt.as_str()),
            (keys::THOUGHTS, self.thoughts.as_str()),
            (keys::ANSWER, self.answer.as_str()),
            (keys::CRITIQUE, self.critique.as_str()),
        ]
    }
}

/// Output bundle returned by an agent.
///
/// Values are arbitrary JSON. The controller reads the keys of the role it
/// invoked and keeps everything else as opaque extras.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentOutput(Map<String, Value>);

impl AgentOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: insert a value
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Convert a parsed JSON value; anything but an object is malformed
    pub fn from_json(value: Value) -> std::result::Result<Self, AgentError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(AgentError::malformed(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Read a value as text. Strings are returned as-is, numbers and
    /// booleans are rendered, null and containers yield `None`.
    pub fn get_text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Read a value as a number. Numeric strings such as `"0.8"` count.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Read a list of strings. A single string becomes a one-element list.
    pub fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        match self.0.get(key)? {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.clone()),
                        Value::Null => None,
                        other => Some(other.to_string()),
                    })
                    .collect(),
            ),
            Value::String(s) if !s.trim().is_empty() => Some(vec![s.clone()]),
            _ => None,
        }
    }

    /// Everything except the given keys
    pub fn extras(&self, known: &[&str]) -> Map<String, Value> {
        self.0
            .iter()
            .filter(|(k, _)| !known.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for AgentOutput {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A callable that maps an input bundle to an output bundle.
///
/// Implementations may call LLMs, the web or tools, and may cache or retry
/// internally; the controller sees none of that. Each invocation is
/// independent as far as the controller is concerned.
#[async_trait]
pub trait AgentPort: Send + Sync {
    /// Invoke the agent
    async fn invoke(&self, input: &AgentInput) -> std::result::Result<AgentOutput, AgentError>;

    /// Name used in logs
    fn name(&self) -> &str {
        "agent"
    }
}

#[async_trait]
impl<T: AgentPort + ?Sized> AgentPort for Arc<T> {
    async fn invoke(&self, input: &AgentInput) -> std::result::Result<AgentOutput, AgentError> {
        (**self).invoke(input).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Shared handle to an agent
pub type SharedAgent = Arc<dyn AgentPort>;

/// Fixed-role agent record: exactly one agent per role
#[derive(Clone)]
pub struct Agents {
    generator: SharedAgent,
    interpreter: SharedAgent,
    reflector: SharedAgent,
}

impl Agents {
    /// Create from three concrete agents
    pub fn new(
        generator: impl AgentPort + 'static,
        interpreter: impl AgentPort + 'static,
        reflector: impl AgentPort + 'static,
    ) -> Self {
        Self {
            generator: Arc::new(generator),
            interpreter: Arc::new(interpreter),
            reflector: Arc::new(reflector),
        }
    }

    /// Create from shared handles
    pub fn from_shared(
        generator: SharedAgent,
        interpreter: SharedAgent,
        reflector: SharedAgent,
    ) -> Self {
        Self {
            generator,
            interpreter,
            reflector,
        }
    }

    pub fn builder() -> AgentsBuilder {
        AgentsBuilder::default()
    }

    /// Create from a role-name mapping.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown role names, duplicate roles
    /// and missing roles.
    pub fn from_map<K: AsRef<str>>(map: HashMap<K, SharedAgent>) -> Result<Self> {
        let mut builder = AgentsBuilder::default();
        for (name, agent) in map {
            let role: AgentRole = name.as_ref().parse()?;
            if builder.slot(role).is_some() {
                return Err(CoaError::Configuration(format!(
                    "agent role '{}' bound more than once",
                    role
                )));
            }
            builder = builder.role(role, agent);
        }
        builder.build()
    }

    /// Get the agent bound to a role
    pub fn get(&self, role: AgentRole) -> &SharedAgent {
        match role {
            AgentRole::Generator => &self.generator,
            AgentRole::Interpreter => &self.interpreter,
            AgentRole::Reflector => &self.reflector,
        }
    }
}

impl fmt::Debug for Agents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agents")
            .field("generator", &self.generator.name())
            .field("interpreter", &self.interpreter.name())
            .field("reflector", &self.reflector.name())
            .finish()
    }
}

/// Builder for [`Agents`]
#[derive(Default)]
pub struct AgentsBuilder {
    generator: Option<SharedAgent>,
    interpreter: Option<SharedAgent>,
    reflector: Option<SharedAgent>,
}

impl AgentsBuilder {
    pub fn generator(self, agent: impl AgentPort + 'static) -> Self {
        self.role(AgentRole::Generator, Arc::new(agent))
    }

    pub fn interpreter(self, agent: impl AgentPort + 'static) -> Self {
        self.role(AgentRole::Interpreter, Arc::new(agent))
    }

    pub fn reflector(self, agent: impl AgentPort + 'static) -> Self {
        self.role(AgentRole::Reflector, Arc::new(agent))
    }

    /// Bind a shared agent to a role, replacing any previous binding
    pub fn role(mut self, role: AgentRole, agent: SharedAgent) -> Self {
        match role {
            AgentRole::Generator => self.generator = Some(agent),
            AgentRole::Interpreter => self.interpreter = Some(agent),
            AgentRole::Reflector => self.reflector = Some(agent),
        }
        self
    }

    fn slot(&self, role: AgentRole) -> Option<&SharedAgent> {
        match role {
            AgentRole::Generator => self.generator.as_ref(),
            AgentRole::Interpreter => self.interpreter.as_ref(),
            AgentRole::Reflector => self.reflector.as_ref(),
        }
    }

    /// Build the record.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming every unbound role.
    pub fn build(self) -> Result<Agents> {
        let missing: Vec<&str> = AgentRole::ALL
            .iter()
            .filter(|role| self.slot(**role).is_none())
            .map(|role| role.as_str())
            .collect();

        match (self.generator, self.interpreter, self.reflector) {
            (Some(generator), Some(interpreter), Some(reflector)) => Ok(Agents {
                generator,
                interpreter,
                reflector,
            }),
            _ => Err(CoaError::Configuration(format!(
                "missing agent role(s): {}",
                missing.join(", ")
            ))),
        }
    }
}
