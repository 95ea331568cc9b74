//! LLM request and response types.

use serde::{Deserialize, Serialize};

/// LLM provider, inferred from the configured model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Anthropic,
    OpenAi,
}

impl Provider {
    /// Infer the provider from a model id: `claude*` models are Anthropic,
    /// everything else is treated as OpenAI-compatible.
    pub fn infer(model: &str) -> Self {
        if model.starts_with("claude") {
            Self::Anthropic
        } else {
            Self::OpenAi
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::OpenAi => write!(f, "openai"),
        }
    }
}

/// A single-prompt completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Optional system prompt
    pub system: Option<String>,
    /// User prompt
    pub prompt: String,
    /// Model override; the client's configured model when absent
    pub model: Option<String>,
    /// Maximum output tokens
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: Option<f64>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            model: None,
            max_tokens: 2048,
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A completion returned by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Concatenated text content
    pub content: String,
    /// Model that produced the completion
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_inference() {
        assert_eq!(Provider::infer("claude-3-5-haiku-20241022"), Provider::Anthropic);
        assert_eq!(Provider::infer("gpt-4o-mini"), Provider::OpenAi);
        assert_eq!(Provider::infer("llama-3.1-70b"), Provider::OpenAi);
    }

    #[test]
    fn test_request_builder() {
        let request = CompletionRequest::new("prompt")
            .with_system("system")
            .with_model("claude-3-5-haiku-20241022")
            .with_max_tokens(512)
            .with_temperature(0.0);

        assert_eq!(request.prompt, "prompt");
        assert_eq!(request.system.as_deref(), Some("system"));
        assert_eq!(request.model.as_deref(), Some("claude-3-5-haiku-20241022"));
        assert_eq!(request.max_tokens, 512);
        assert_eq!(request.temperature, Some(0.0));
    }
}
