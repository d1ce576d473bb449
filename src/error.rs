//! Error types for the Jobs protocol client
//!
//! Per-message failures (`Parse`, `UnexpectedShape`, `BufferTooSmall`,
//! `WrongTokenType`, `Unroutable`) are recoverable: the driver logs them and
//! moves on to the next message. Transport and configuration failures are
//! surfaced to the caller of the operation that hit them.

use crate::json::{TokenKind, TokenizeError};
use thiserror::Error;

/// Main error type for Jobs operations
#[derive(Debug, Error)]
pub enum JobsError {
    #[error("Failed to parse JSON payload: {0}")]
    Parse(#[from] TokenizeError),

    #[error("Unexpected payload shape: {0}")]
    UnexpectedShape(String),

    #[error("Buffer too small: need {needed} bytes, capacity is {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    #[error("Wrong token type: expected {expected}, found {found}")]
    WrongTokenType {
        expected: &'static str,
        found: TokenKind,
    },

    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No subscription matches topic: {topic}")]
    Unroutable { topic: String },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl JobsError {
    /// Create unexpected shape error
    pub fn unexpected_shape<S: Into<String>>(message: S) -> Self {
        Self::UnexpectedShape(message.into())
    }

    /// Create invalid request error
    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Wrap any transport failure
    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport(Box::new(error))
    }

    /// Whether this failure is scoped to a single inbound message
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            JobsError::Parse(_)
                | JobsError::UnexpectedShape(_)
                | JobsError::BufferTooSmall { .. }
                | JobsError::WrongTokenType { .. }
                | JobsError::Unroutable { .. }
        )
    }
}

impl From<crate::transport::mqtt::MqttError> for JobsError {
    fn from(error: crate::transport::mqtt::MqttError) -> Self {
        JobsError::transport(error)
    }
}

/// Result type for Jobs operations
pub type JobsResult<T> = Result<T, JobsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_too_small_display() {
        let error = JobsError::BufferTooSmall {
            needed: 11,
            capacity: 4,
        };
        assert_eq!(
            error.to_string(),
            "Buffer too small: need 11 bytes, capacity is 4"
        );
    }

    #[test]
    fn test_wrong_token_type_display() {
        let error = JobsError::WrongTokenType {
            expected: "string",
            found: TokenKind::Object,
        };
        assert_eq!(
            error.to_string(),
            "Wrong token type: expected string, found object"
        );
    }

    #[test]
    fn test_parse_error_from_tokenizer() {
        let error: JobsError = TokenizeError::NoMemory { capacity: 8 }.into();
        assert!(matches!(error, JobsError::Parse(_)));
        assert!(error.to_string().contains("8"));
    }

    #[test]
    fn test_per_message_errors_are_recoverable() {
        assert!(JobsError::from(TokenizeError::Partial).is_recoverable());
        assert!(JobsError::unexpected_shape("root is an array").is_recoverable());
        assert!(JobsError::BufferTooSmall {
            needed: 2,
            capacity: 1
        }
        .is_recoverable());
        assert!(JobsError::Unroutable {
            topic: "a/b".to_string()
        }
        .is_recoverable());
    }

    #[test]
    fn test_transport_and_request_errors_are_not_recoverable() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(!JobsError::transport(io).is_recoverable());
        assert!(!JobsError::invalid_request("status not set").is_recoverable());
    }

    #[test]
    fn test_constructors() {
        let error = JobsError::invalid_request("missing job id");
        assert_eq!(error.to_string(), "Invalid request: missing job id");

        let error = JobsError::unexpected_shape("no execution");
        assert_eq!(error.to_string(), "Unexpected payload shape: no execution");
    }
}
