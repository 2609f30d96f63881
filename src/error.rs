//! Error types for the wealth advisor

use thiserror::Error;

/// Result type alias for advisor operations
pub type Result<T> = std::result::Result<T, AdvisorError>;

#[derive(Error, Debug)]
pub enum AdvisorError {

    // =============================
    // Configuration
    // =============================

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // Model Provider Errors
    // =============================

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM HTTP error ({status}): {message}")]
    LlmHttp {
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    // =============================
    // Tool Errors
    // =============================

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("Arithmetic error: {0}")]
    Arithmetic(String),

    #[error("Lookup error: {0}")]
    Lookup(String),

    #[error("Market data error: {0}")]
    MarketData(String),

    // =============================
    // Protocol / Extraction Errors
    // =============================

    #[error("Extraction error: {0}")]
    Extraction(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdvisorError {
    /// Whether a failed model call is worth repeating.
    pub fn is_retryable(&self) -> bool {
        match self {
            AdvisorError::Timeout(_) => true,
            AdvisorError::LlmHttp { status, .. } => *status == 429 || *status >= 500,
            AdvisorError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let rate_limited = AdvisorError::LlmHttp {
            status: 429,
            message: "quota".to_string(),
            retry_after_secs: Some(2),
        };
        let unavailable = AdvisorError::LlmHttp {
            status: 503,
            message: "overloaded".to_string(),
            retry_after_secs: None,
        };
        let unauthorized = AdvisorError::LlmHttp {
            status: 401,
            message: "bad key".to_string(),
            retry_after_secs: None,
        };

        assert!(rate_limited.is_retryable());
        assert!(unavailable.is_retryable());
        assert!(!unauthorized.is_retryable());
        assert!(AdvisorError::Timeout("model".into()).is_retryable());
        assert!(!AdvisorError::Arithmetic("division by zero".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = AdvisorError::RetriesExhausted {
            attempts: 4,
            last_error: "overloaded".to_string(),
        };
        assert_eq!(err.to_string(), "Gave up after 4 attempts: overloaded");
    }
}
