//! Error types for secret backend operations.

use thiserror::Error;

/// Result type for secret backend operations.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Errors that can occur while talking to the secret backend.
#[derive(Error, Debug)]
pub enum VaultError {
    /// The backend could not be reached or the request did not complete.
    #[error("Backend connection failed: {message}")]
    ConnectionFailed { message: String },

    /// The backend answered with a non-success status. The raw body is kept
    /// verbatim because it carries the backend's own error list.
    #[error("{body}")]
    UnexpectedStatus { status: u16, body: String },

    /// A request that needs a bearer credential was made without one.
    #[error("No bearer token configured for {operation}")]
    MissingToken { operation: String },

    /// The response parsed but lacked a section the operation depends on.
    #[error("Backend response missing '{field}'")]
    MissingField { field: String },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl VaultError {
    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: message.into() }
    }

    /// Create an unexpected status error.
    pub fn unexpected_status(status: u16, body: impl Into<String>) -> Self {
        Self::UnexpectedStatus { status, body: body.into() }
    }

    /// Create a missing token error.
    pub fn missing_token(operation: impl Into<String>) -> Self {
        Self::MissingToken { operation: operation.into() }
    }

    /// Create a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField { field: field.into() }
    }

    /// Create a config error.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError { message: message.into() }
    }

    /// HTTP status returned by the backend, if the request got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for VaultError {
    fn from(err: reqwest::Error) -> Self {
        Self::connection_failed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let err = VaultError::connection_failed("timeout");
        assert!(matches!(err, VaultError::ConnectionFailed { .. }));
        assert_eq!(err.to_string(), "Backend connection failed: timeout");

        let err = VaultError::missing_field("wrap_info");
        assert!(matches!(err, VaultError::MissingField { .. }));
        assert!(err.status().is_none());
    }

    #[test]
    fn test_unexpected_status_displays_raw_body() {
        let err = VaultError::unexpected_status(403, r#"{"errors":["permission denied"]}"#);
        assert_eq!(err.status(), Some(403));
        assert_eq!(err.to_string(), r#"{"errors":["permission denied"]}"#);
    }
}
