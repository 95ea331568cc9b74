//! Error types for vigil.

use thiserror::Error;

/// Result type alias using vigil's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, fatal at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Required configuration keys are missing
    #[error("Missing configuration keys: {}", keys.join(", "))]
    MissingConfig { keys: Vec<String> },

    /// Fetch error against an external source
    #[error("Fetch error ({source_name}): {message}")]
    Fetch {
        source_name: String,
        message: String,
        /// Network errors and 5xx are retryable; 4xx and DNS failures are not
        retryable: bool,
    },

    /// Malformed RSS, HTML, or JSON payload
    #[error("Parse error: {0}")]
    Parse(String),

    /// LLM API error or schema violation
    #[error("LLM error: {0}")]
    Llm(String),

    /// Geocoding failure
    #[error("Geocoding error: {0}")]
    Geocode(String),

    /// Persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Timeout during operation
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Cycle deadline reached; cooperative, not a failure
    #[error("Cycle cancelled")]
    Cancelled,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a transient fetch error (network, 5xx, timeout).
    pub fn transient_fetch(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            source_name: source_name.into(),
            message: message.into(),
            retryable: true,
        }
    }

    /// Create a permanent fetch error (4xx, NXDOMAIN).
    pub fn permanent_fetch(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            source_name: source_name.into(),
            message: message.into(),
            retryable: false,
        }
    }

    /// Create a missing-config error listing every absent mandatory key.
    pub fn missing_config(keys: Vec<String>) -> Self {
        Self::MissingConfig { keys }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Whether a retry may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch { retryable, .. } => *retryable,
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Whether this error must surface to the caller instead of being
    /// absorbed into cycle stats.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::MissingConfig { .. } | Self::Storage(_)
        )
    }
}
