use thiserror::Error;

use crate::vault::VaultError;

/// Result type for certificate lifecycle operations.
pub type Result<T> = std::result::Result<T, CertificateError>;

/// Errors surfaced while issuing, parsing or installing a TLS identity.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// The backend refused or failed the issuance call.
    #[error("certificate manager: issuance failed: {0}")]
    Issuance(#[from] VaultError),

    /// No certificates were found in the issued PEM.
    #[error("certificate manager: issued {what} does not contain any certificates")]
    EmptyCertificateChain { what: &'static str },

    /// The certificate PEM contents were invalid or unreadable.
    #[error("certificate manager: issued {what} is not a valid PEM: {source}")]
    InvalidCertificatePem {
        what: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The private key PEM contents were invalid or unsupported.
    #[error("certificate manager: issued private key is not usable: {source}")]
    InvalidPrivateKey {
        #[source]
        source: anyhow::Error,
    },

    /// The leaf certificate could not be parsed for expiry and serial.
    #[error("certificate manager: failed to extract certificate metadata: {source}")]
    CertificateMetadata {
        #[source]
        source: anyhow::Error,
    },

    /// rustls rejected a configuration built from the identity.
    #[error("certificate manager: TLS configuration rejected: {0}")]
    TlsConfig(#[from] rustls::Error),
}

impl CertificateError {
    /// True when the failure came from talking to the backend rather than
    /// from the material it returned.
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::Issuance(_))
    }
}
