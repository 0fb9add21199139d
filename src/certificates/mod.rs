//! # Certificate lifecycle
//!
//! A [`CertificateManager`] owns one TLS identity issued by the backend's PKI
//! engine and replaces it at half its remaining lifetime. rustls reads the
//! current identity on every handshake through [`ServerCertResolver`] and
//! [`ClientCertResolver`], so rotation never interrupts the listener or the
//! client.
//!
//! Identities are swapped as whole `Arc` values under a lock held only for
//! the swap. Readers see either the old or the new identity, never a mix.

pub mod error;
pub mod identity;
pub mod manager;
pub mod resolver;

pub use error::{CertificateError, Result};
pub use identity::TlsIdentity;
pub use manager::{
    renewal_delay, CertificateIssuer, CertificateManager, PkiIssueConfig, MIN_RENEWAL_DELAY,
    RENEWAL_RETRY_DELAY,
};
pub use resolver::{
    mutual_tls_client_config, mutual_tls_server_config, ClientCertResolver, ServerCertResolver,
};
