//! Error types for SYNCWELL operations

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification attached to every remote failure at the transport boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No response was received.
    Network,
    /// The server rejected the input as invalid.
    Validation,
    /// Server-side failure or any other rejected request.
    Server,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Validation => write!(f, "validation"),
            Self::Server => write!(f, "server"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A classified failure from the remote-access collaborator.
///
/// The core never looks past `kind`, `code` and `details`; transport specifics
/// (status codes, headers) stay inside the client that produced the error.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[error("{kind} error ({code}): {message}")]
pub struct RemoteError {
    pub kind: ErrorKind,
    /// Machine-readable code, e.g. `network_error` or `ticket_not_found`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl RemoteError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, "network_error", message)
    }

    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, code, message)
    }

    pub fn server(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Server, code, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, "unknown_error", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Whether a user-initiated retry can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Network | ErrorKind::Server)
    }

    /// Input field a validation error is attributed to, when the server named one.
    pub fn field(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|d| d.get("field"))
            .and_then(|f| f.as_str())
    }
}

/// Lazy tree errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TreeError {
    #[error("Node not found: {path}")]
    NodeNotFound { path: String },

    #[error("Failed to load children of {path}: {source}")]
    LoadFailed {
        path: String,
        #[source]
        source: RemoteError,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Debouncer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DebounceError {
    #[error("Debouncer has been shut down")]
    Closed,
}

/// Master error type for all SYNCWELL errors.
#[derive(Debug, Clone, Error)]
pub enum SyncwellError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Debounce error: {0}")]
    Debounce(#[from] DebounceError),
}

impl SyncwellError {
    /// The remote failure behind this error, if any.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(err) => Some(err),
            Self::Tree(TreeError::LoadFailed { source, .. }) => Some(source),
            _ => None,
        }
    }
}

/// Result type alias for SYNCWELL operations.
pub type SyncwellResult<T> = Result<T, SyncwellError>;

// =============================================================================
// TESTS
// =============================================================================
