//! LLM client abstraction.
//!
//! A unified interface over the configured completion provider. The
//! pipeline treats the LLM as a suggester: callers validate every response
//! and fall back to deterministic extraction when it misbehaves, so this
//! module only has to deliver completions and enforce its own concurrency
//! cap (independent of the collector's).
//!
//! ## Example
//!
//! ```rust,ignore
//! use vigil::llm::{AnthropicClient, ClientConfig, CompletionRequest, LlmClient};
//!
//! let client = AnthropicClient::new(
//!     ClientConfig::new("your-api-key", "claude-3-5-haiku-20241022"),
//! );
//! let completion = client.complete(CompletionRequest::new("Extract events...")).await?;
//! ```

mod client;
mod types;

pub use client::{build_client, AnthropicClient, ClientConfig, GatedClient, LlmClient, OpenAiClient};
pub use types::{Completion, CompletionRequest, Provider};
