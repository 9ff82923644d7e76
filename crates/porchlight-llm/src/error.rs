//! Error types for the classification subsystem.

use thiserror::Error;

/// Errors that can occur during model calls.
#[derive(Error, Debug)]
pub enum LlmError {
    /// API error with status code
    #[error("API error: status {status}, {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },

    /// Rate limit signal from the service
    #[error("rate limit exceeded: {message}")]
    RateLimitExceeded {
        /// Error message
        message: String,
    },

    /// Every credential in the pool has been rate-limited
    #[error("all credentials exhausted")]
    CredentialsExhausted,

    /// No credentials could be loaded at startup
    #[error("no API keys found in keys file or environment")]
    NoCredentials,

    /// Response parsing error
    #[error("failed to parse response: {0}")]
    ParseError(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error loading credentials
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for classification operations.
pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LlmError::ApiError {
            status: 429,
            message: "Too Many Requests".to_string(),
        };
        assert_eq!(err.to_string(), "API error: status 429, Too Many Requests");

        let err = LlmError::CredentialsExhausted;
        assert_eq!(err.to_string(), "all credentials exhausted");
    }
}
