//! Error types for the stratagem domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] ties them together
//! for the engines and the binary.

use thiserror::Error;

/// The top-level error type for all stratagem operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- LLM client errors ---
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is the cooperative cancellation condition.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Llm(LlmError::Cancelled))
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Transport- and status-level failures reported by a completion backend.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Rate limiting and 5xx responses are transient; everything else is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. } => true,
            ProviderError::ApiError { status_code, .. } => {
                *status_code == 429 || *status_code >= 500
            }
            _ => false,
        }
    }
}

/// Failures surfaced by the resilient LLM client.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// The shared cancellation token fired. Never retried.
    #[error("Request cancelled")]
    Cancelled,

    /// The backend answered successfully but without a message body.
    #[error("No completion returned by the model")]
    NoCompletion,

    /// A non-retryable status, or the last retryable one once retries ran out.
    #[error("{message}")]
    Api { status: u16, message: String },

    /// Any other backend failure (network, authentication, configuration).
    #[error(transparent)]
    Provider(ProviderError),
}

impl From<ProviderError> for LlmError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::ApiError {
                status_code,
                message,
            } => {
                let message = if message.trim().is_empty() {
                    format!("LLM API error: {status_code}")
                } else {
                    message
                };
                LlmError::Api {
                    status: status_code,
                    message,
                }
            }
            ProviderError::RateLimited { .. } => LlmError::Api {
                status: 429,
                message: "LLM API error: 429".into(),
            },
            other => LlmError::Provider(other),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Unknown tool '{name}'. Available tools: {available}")]
    NotFound { name: String, available: String },
}
