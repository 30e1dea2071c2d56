//! Error types for the b2 client
//!
//! Every failure is one variant of [`Error`], so callers match on the
//! category instead of inspecting strings.

use serde::{Deserialize, Serialize};

use crate::retry::is_fatal;

/// Result type alias for b2 operations
pub type Result<T> = std::result::Result<T, Error>;

/// An error body returned by the B2 API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceError {
    /// HTTP status of the response
    pub status: u16,
    /// Machine readable error code, e.g. `expired_auth_token`
    pub code: String,
    /// Human readable message
    #[serde(default)]
    pub message: String,
}

impl ServiceError {
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Synthetic error for a non-200 response without a parseable body
    pub fn unrecognised(status: u16) -> Self {
        Self::new(status, "unknown", "Unrecognised status code")
    }

    /// Whether retrying the request cannot help
    pub fn is_fatal(&self) -> bool {
        is_fatal(self.status, &self.code)
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} (status {})", self.code, self.message, self.status)
    }
}

/// Main error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network, DNS or TLS failure before a response was received
    #[error("Transport error: {0}")]
    Transport(String),

    /// Error reported by the B2 API
    #[error("Service error: {0}")]
    Service(ServiceError),

    /// The account endpoint rejected the credential exchange
    #[error("Authorization failed: {0}")]
    Auth(ServiceError),

    /// Local and remote SHA1 digests disagree
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Bucket or file does not exist
    #[error("{0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether a single retry could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Service(e) | Error::Auth(e) => !e.is_fatal(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Integrity(_)
            | Error::NotFound(_)
            | Error::Config(_)
            | Error::InvalidArgument(_)
            | Error::Json(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// The service error carried by this error, if any
    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            Error::Service(e) | Error::Auth(e) => Some(e),
            _ => None,
        }
    }
}
