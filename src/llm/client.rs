//! LLM client trait and provider implementations.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::error::{Error, Result};

use super::types::{Completion, CompletionRequest, Provider};

/// LLM client trait for making completions.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete a prompt.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;

    /// The configured default model.
    fn model(&self) -> &str;
}

/// Configuration for LLM clients.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API key
    pub api_key: String,
    /// Default model
    pub model: String,
    /// Base URL override
    pub base_url: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            timeout_secs: 120,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

fn build_http_client(timeout_secs: u64) -> Client {
    let timeout = Duration::from_secs(timeout_secs);

    // reqwest's default builder runs proxy auto-detection, which has
    // panicked under locked-down sandboxes where ingestion runs headless.
    // Build without proxy support when that happens.
    let attempt = catch_unwind(AssertUnwindSafe(|| Client::builder().timeout(timeout).build()));
    if let Ok(Ok(client)) = attempt {
        return client;
    }
    Client::builder()
        .no_proxy()
        .timeout(timeout)
        .build()
        .expect("proxy-free HTTP client builds")
}

/// Build the provider client matching the configured model id.
pub fn build_client(config: ClientConfig) -> Arc<dyn LlmClient> {
    match Provider::infer(&config.model) {
        Provider::Anthropic => Arc::new(AnthropicClient::new(config)),
        Provider::OpenAi => Arc::new(OpenAiClient::new(config)),
    }
}

/// Anthropic Claude client.
pub struct AnthropicClient {
    config: ClientConfig,
    http: Client,
}

impl AnthropicClient {
    const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(config: ClientConfig) -> Self {
        let http = build_http_client(config.timeout_secs);
        Self { config, http }
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_BASE_URL)
    }
}

// Anthropic API types
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let model = request.model.unwrap_or_else(|| self.config.model.clone());

        let api_request = AnthropicRequest {
            model: model.clone(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: request.prompt,
            }],
            max_tokens: request.max_tokens,
            system: request.system,
            temperature: request.temperature,
        };

        let url = format!("{}/v1/messages", self.base_url());

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::Llm(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Llm(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<AnthropicError>(&body) {
                return Err(Error::Llm(format!(
                    "Anthropic API error ({}): {}",
                    error.error.error_type, error.error.message
                )));
            }
            return Err(Error::Llm(format!(
                "Anthropic API error ({}): {}",
                status, body
            )));
        }

        let api_response: AnthropicResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Llm(format!("Failed to parse response: {}", e)))?;

        let content = api_response
            .content
            .iter()
            .filter_map(|c| c.text.as_ref())
            .cloned()
            .collect::<Vec<_>>()
            .join("");

        Ok(Completion {
            content,
            model: api_response.model,
        })
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// OpenAI-compatible client.
pub struct OpenAiClient {
    config: ClientConfig,
    http: Client,
}

impl OpenAiClient {
    const DEFAULT_BASE_URL: &'static str = "https://api.openai.com";

    pub fn new(config: ClientConfig) -> Self {
        let http = build_http_client(config.timeout_secs);
        Self { config, http }
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_BASE_URL)
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    model: String,
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let model = request.model.unwrap_or_else(|| self.config.model.clone());

        let mut messages = Vec::new();
        if let Some(system) = request.system {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: system,
            });
        }
        messages.push(OpenAiMessage {
            role: "user".to_string(),
            content: request.prompt,
        });

        let api_request = OpenAiRequest {
            model: model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let url = format!("{}/v1/chat/completions", self.base_url());

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::Llm(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Llm(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<OpenAiError>(&body) {
                return Err(Error::Llm(format!(
                    "OpenAI API error: {}",
                    error.error.message
                )));
            }
            return Err(Error::Llm(format!(
                "OpenAI API error ({}): {}",
                status, body
            )));
        }

        let api_response: OpenAiResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Llm(format!("Failed to parse response: {}", e)))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Llm("No choices in response".to_string()))?;

        Ok(Completion {
            content: choice.message.content,
            model: api_response.model,
        })
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// Wrapper enforcing the LLM concurrency cap, which is independent of the
/// collector's fetch cap.
pub struct GatedClient {
    inner: Arc<dyn LlmClient>,
    permits: Arc<Semaphore>,
}

impl GatedClient {
    pub fn new(inner: Arc<dyn LlmClient>, max_concurrent: usize) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }
}

#[async_trait]
impl LlmClient for GatedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Internal("LLM semaphore closed".to_string()))?;
        self.inner.complete(request).await
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::new("test-key", "claude-3-5-haiku-20241022")
            .with_base_url("https://custom.api.com")
            .with_timeout(60);

        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.model, "claude-3-5-haiku-20241022");
        assert_eq!(config.base_url, Some("https://custom.api.com".to_string()));
        assert_eq!(config.timeout_secs, 60);
    }

    #[test]
    fn test_build_client_infers_provider() {
        let anthropic = build_client(ClientConfig::new("k", "claude-3-5-haiku-20241022"));
        assert_eq!(anthropic.model(), "claude-3-5-haiku-20241022");

        let openai = build_client(ClientConfig::new("k", "gpt-4o-mini"));
        assert_eq!(openai.model(), "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_gated_client_limits_concurrency() {
        struct SlowClient;

        #[async_trait]
        impl LlmClient for SlowClient {
            async fn complete(&self, _request: CompletionRequest) -> Result<Completion> {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(Completion {
                    content: "{}".into(),
                    model: "mock".into(),
                })
            }

            fn model(&self) -> &str {
                "mock"
            }
        }

        let gated = Arc::new(GatedClient::new(Arc::new(SlowClient), 2));
        let start = std::time::Instant::now();
        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let client = gated.clone();
                tokio::spawn(async move { client.complete(CompletionRequest::new("x")).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        // Four 20ms calls through two permits need at least two waves.
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
