//! # Error Handling
//!
//! Crate-level error used at process startup and at the edges where
//! subsystem errors meet. Each subsystem keeps its own `thiserror` enum;
//! this type wraps them so binaries can report one error.

use crate::certificates::CertificateError;
use crate::lease::LeaseError;
use crate::vault::VaultError;
use crate::workload::DirectoryError;

/// Custom result type for courier operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the courier processes
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network transport errors (HTTP, TLS)
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Certificate(#[from] CertificateError),

    #[error(transparent)]
    Lease(#[from] LeaseError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }
}
