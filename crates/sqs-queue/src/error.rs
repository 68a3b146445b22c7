//! Error types for queue operations.
//!
//! Transport failures reach callers only through [`TransportError`], which is
//! produced from the raw [`TransportFailure`] shape by the `From` conversion in
//! this module. Nothing else in the crate builds a `TransportError`.

use crate::transport::TransportFailure;
use std::time::Duration;
use thiserror::Error;

/// Namespace stamped on every normalized transport error
pub const ERROR_NAMESPACE: &str = "QUEUE";

/// Error kind used when the transport does not report an error code
pub const FALLBACK_ERROR_KIND: &str = "SQS.ERROR";

/// Error kind reported for local payload validation failures
pub const INVALID_PAYLOAD_KIND: &str = "SQS.INVALID";

const FALLBACK_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Comprehensive error type for all queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Invalid payload: {message}")]
    InvalidPayload { message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Message '{message_id}' has no receipt handle and cannot be deleted")]
    MissingReceipt { message_id: String },

    #[error("Operation cancelled")]
    Cancelled,
}

impl QueueError {
    pub(crate) fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    /// Error kind, matching the transport's error code for transport failures
    pub fn kind(&self) -> &str {
        match self {
            Self::InvalidPayload { .. } => INVALID_PAYLOAD_KIND,
            Self::Transport(e) => &e.kind,
            Self::Configuration(_) => "SQS.CONFIGURATION",
            Self::Validation(_) => "SQS.VALIDATION",
            Self::MissingReceipt { .. } => "SQS.MISSING_RECEIPT",
            Self::Cancelled => "SQS.CANCELLED",
        }
    }

    /// Namespace of the error; always [`ERROR_NAMESPACE`]
    pub fn namespace(&self) -> &str {
        match self {
            Self::Transport(e) => &e.namespace,
            _ => ERROR_NAMESPACE,
        }
    }

    /// Check if error is transient and the operation may be retried by the caller
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.retryable.unwrap_or(false),
            Self::InvalidPayload { .. } => false,
            Self::Configuration(_) => false,
            Self::Validation(_) => false,
            Self::MissingReceipt { .. } => false,
            Self::Cancelled => false,
        }
    }

    /// Get the retry delay suggested by the transport, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transport(e) => e.retry_delay,
            _ => None,
        }
    }
}

/// A transport failure normalized into the crate's uniform error shape
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    /// Transport error code, or [`FALLBACK_ERROR_KIND`]
    pub kind: String,
    pub message: String,
    /// Always [`ERROR_NAMESPACE`]
    pub namespace: String,
    pub status_code: Option<u16>,
    pub request_id: Option<String>,
    pub retryable: Option<bool>,
    pub retry_delay: Option<Duration>,
}

impl From<TransportFailure> for TransportError {
    fn from(failure: TransportFailure) -> Self {
        Self {
            kind: failure
                .code
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| FALLBACK_ERROR_KIND.to_string()),
            message: failure
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| FALLBACK_ERROR_MESSAGE.to_string()),
            namespace: ERROR_NAMESPACE.to_string(),
            status_code: failure.status_code,
            request_id: failure.request_id,
            retryable: failure.retryable,
            retry_delay: failure.retry_delay,
        }
    }
}

impl From<TransportFailure> for QueueError {
    fn from(failure: TransportFailure) -> Self {
        let error = TransportError::from(failure);
        tracing::debug!(
            kind = %error.kind,
            status_code = ?error.status_code,
            request_id = ?error.request_id,
            "Queue transport reported a failure"
        );
        Self::Transport(error)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(error: config::ConfigError) -> Self {
        Self::Parsing {
            message: error.to_string(),
        }
    }
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
