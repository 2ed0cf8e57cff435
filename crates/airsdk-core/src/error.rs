//! Error types for airsdk.
//!
//! Every failure the runtime can surface is a variant of [`AirError`]. Nothing
//! in the core retries or swallows these; retry policy belongs to the
//! transport.

use std::time::Duration;

use serde_json::Value;

/// The main error type for airsdk operations.
#[derive(Debug, thiserror::Error)]
pub enum AirError {
    /// The requested primary key does not exist server-side.
    #[error("{model} '{key}' not found")]
    NotFound { model: String, key: String },

    /// The server (or a local pre-flight check) rejected a create/update payload.
    #[error("{model} payload rejected for [{}]: {detail}", .fields.join(", "))]
    ValidationRejected {
        model: String,
        fields: Vec<String>,
        detail: Value,
    },

    /// Malformed body, or a status outside the expected success/validation set.
    #[error("Received an unexpected response from the API ({}): {message}", .status.map(|s| s.to_string()).unwrap_or_else(|| "no status".to_string()))]
    UnexpectedResponse { status: Option<u16>, message: String },

    /// The credential is valid but not allowed to perform the call.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The instance's resource was deleted and must no longer be referenced.
    #[error("{model} '{key}' has been deleted and should no longer be referenced")]
    StaleReference { model: String, key: String },

    /// A legacy field or verb has no canonical equivalent in this version.
    #[error("'{name}' is not implemented in this version: {hint}")]
    UnsupportedLegacyCall { name: String, hint: String },

    /// The model type does not expose the requested operation.
    #[error("{model} does not support '{operation}'")]
    UnsupportedOperation { model: String, operation: String },

    /// Field name not declared by the model.
    #[error("{model} has no field '{field}'")]
    UnknownField { model: String, field: String },

    /// Filter name not accepted by the endpoint.
    #[error("'{filter}' is not a valid filter for {model}")]
    UnknownFilter { model: String, filter: String },

    /// Attempted write to the primary key or a server-assigned field.
    #[error("{model}.{field} is read-only")]
    ReadOnlyField { model: String, field: String },

    /// Operation requires a primary key but the instance was never created.
    #[error("{model} instance is unsaved; only create is valid")]
    Unsaved { model: String },

    /// Caller passed an argument the runtime cannot use.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Request timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Transport-level failure (connection refused, DNS, TLS, ...)
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP client errors (wraps reqwest errors)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration value
    #[error("Invalid configuration for '{field}': {message}")]
    InvalidConfig { field: String, message: String },

    /// JSON serialization errors (wraps serde_json errors)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AirError {
    /// Create a config error with a message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid config error
    pub fn invalid_config<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found<M: Into<String>, K: Into<String>>(model: M, key: K) -> Self {
        Self::NotFound {
            model: model.into(),
            key: key.into(),
        }
    }

    /// Create a validation error for a set of fields.
    pub fn validation<M: Into<String>>(model: M, fields: Vec<String>, detail: Value) -> Self {
        Self::ValidationRejected {
            model: model.into(),
            fields,
            detail,
        }
    }

    pub fn unexpected<S: Into<String>>(status: Option<u16>, message: S) -> Self {
        Self::UnexpectedResponse {
            status,
            message: message.into(),
        }
    }

    pub fn stale<M: Into<String>, K: Into<String>>(model: M, key: K) -> Self {
        Self::StaleReference {
            model: model.into(),
            key: key.into(),
        }
    }

    /// Create an error for a legacy name that was removed.
    pub fn unsupported_legacy<N: Into<String>, H: Into<String>>(name: N, hint: H) -> Self {
        Self::UnsupportedLegacyCall {
            name: name.into(),
            hint: hint.into(),
        }
    }

    pub fn unsupported_operation<M: Into<String>, O: Into<String>>(model: M, operation: O) -> Self {
        Self::UnsupportedOperation {
            model: model.into(),
            operation: operation.into(),
        }
    }

    pub fn unknown_field<M: Into<String>, F: Into<String>>(model: M, field: F) -> Self {
        Self::UnknownField {
            model: model.into(),
            field: field.into(),
        }
    }

    pub fn unknown_filter<M: Into<String>, F: Into<String>>(model: M, filter: F) -> Self {
        Self::UnknownFilter {
            model: model.into(),
            filter: filter.into(),
        }
    }

    pub fn read_only<M: Into<String>, F: Into<String>>(model: M, field: F) -> Self {
        Self::ReadOnlyField {
            model: model.into(),
            field: field.into(),
        }
    }

    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// HTTP status associated with this error, when one was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::NotFound { .. } => Some(404),
            Self::Forbidden(_) => Some(403),
            Self::UnexpectedResponse { status, .. } => *status,
            Self::HttpClient(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is transient (a caller may choose to retry)
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) | Self::HttpClient(_) => true,
            Self::UnexpectedResponse {
                status: Some(status),
                ..
            } => *status >= 500,
            _ => false,
        }
    }

    /// Errors raised locally before anything was sent.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownField { .. }
                | Self::UnknownFilter { .. }
                | Self::ReadOnlyField { .. }
                | Self::Unsaved { .. }
                | Self::InvalidArgument(_)
                | Self::UnsupportedOperation { .. }
                | Self::UnsupportedLegacyCall { .. }
        )
    }
}

/// Result type alias for airsdk operations
pub type Result<T> = std::result::Result<T, AirError>;
