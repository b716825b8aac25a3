//! Error types for the statewright domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each external collaborator (model, tool, store) has its own error enum;
//! the top-level [`Error`] adds the engine's own failure kinds.

use thiserror::Error;

/// The top-level error type for all statewright operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- State store errors ---
    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    // --- Configuration errors (raised before any external call) ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Model returned text that is not the JSON we asked for ---
    #[error("Malformed model output: {message}")]
    MalformedModelOutput { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Batch context ---
    #[error("Interaction #{index} failed: {source}")]
    Interaction {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error aborts an interaction before any model call.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Config { .. } => true,
            Self::Interaction { source, .. } => source.is_configuration(),
            _ => false,
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("State store not connected: {0}")]
    Unavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid state payload: {0}")]
    InvalidPayload(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn malformed_output_carries_parse_message() {
        let err = Error::MalformedModelOutput {
            message: "expected value at line 1 column 1".into(),
        };
        assert!(err.to_string().contains("line 1 column 1"));
    }

    #[test]
    fn interaction_error_reports_index_and_cause() {
        let err = Error::Interaction {
            index: 3,
            source: Box::new(Error::config("missing message")),
        };
        let text = err.to_string();
        assert!(text.contains("#3"));
        assert!(text.contains("missing message"));
        assert!(err.is_configuration());
    }

    #[test]
    fn store_error_converts_into_top_level() {
        let err: Error = StoreError::Unavailable("no backend".into()).into();
        assert!(matches!(err, Error::Store(StoreError::Unavailable(_))));
        assert!(!err.is_configuration());
    }
}
