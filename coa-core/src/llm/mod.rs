//! LLM provider seam
//!
//! Concrete clients live outside this crate. They implement [`LLMProvider`]
//! and are turned into agents with [`crate::agent::llm_agent`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Who a chat message is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

/// One chat turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// A chat completion request as the adapter builds it
#[derive(Debug, Clone, Default)]
pub struct LLMRequest {
    pub messages: Vec<Message>,

    /// Clamped to 0.0..=2.0 by [`LLMRequest::temperature`]
    pub temperature: Option<f32>,

    pub max_tokens: Option<usize>,

    pub stop_sequences: Vec<String>,
}

impl LLMRequest {
    /// Single user turn, no system message
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(prompt)],
            ..Default::default()
        }
    }

    /// System turn followed by one user turn
    pub fn with_system_prompt(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Self {
        Self {
            messages: vec![Message::system(system_prompt), Message::user(user_prompt)],
            ..Default::default()
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 2.0));
        self
    }

    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// What a provider hands back for one request
#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub content: String,

    /// Absent when the backend does not report usage
    pub usage: Option<TokenUsage>,
}

/// Token accounting as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// Errors reported by providers
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Rate limit exceeded
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Backend unavailable (5xx, connection refused)
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Request timed out on the provider side
    #[error("provider timed out: {0}")]
    Timeout(String),

    /// The request was rejected (bad key, bad model, bad input)
    #[error("request rejected: {0}")]
    Request(String),

    /// The provider answered with something unusable
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited(_)
                | ProviderError::Unavailable(_)
                | ProviderError::Timeout(_)
        )
    }
}

/// Trait for LLM provider implementations.
///
/// Implementors handle the actual HTTP calls (OpenAI, Claude, Ollama, ...)
/// and classify failures with [`ProviderError`].
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate text from a structured request
    async fn generate_request(&self, request: &LLMRequest) -> Result<LLMResponse, ProviderError>;

    /// Provider/model label used in logs
    fn model_name(&self) -> &str {
        "unknown"
    }
}

#[async_trait]
impl<T: LLMProvider + ?Sized> LLMProvider for std::sync::Arc<T> {
    async fn generate_request(&self, request: &LLMRequest) -> Result<LLMResponse, ProviderError> {
        (**self).generate_request(request).await
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let request = LLMRequest::with_system_prompt("be terse", "2+2?")
            .temperature(3.5)
            .max_tokens(64);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, MessageRole::System);
        assert_eq!(request.temperature, Some(2.0));
        assert_eq!(request.max_tokens, Some(64));

        let request = LLMRequest::from_prompt("hi");
        assert_eq!(request.messages, vec![Message::user("hi")]);
    }

    #[test]
    fn test_provider_error_classification() {
        assert!(ProviderError::RateLimited("429".into()).is_transient());
        assert!(ProviderError::Unavailable("503".into()).is_transient());
        assert!(ProviderError::Timeout("read".into()).is_transient());
        assert!(!ProviderError::Request("401".into()).is_transient());
        assert!(!ProviderError::InvalidResponse("empty".into()).is_transient());
    }
}
