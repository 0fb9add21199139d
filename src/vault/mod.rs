//! Client side of the secret backend.
//!
//! The backend is the root of trust for everything this crate distributes:
//! it issues certificates, mints and wraps tokens, renews leases and opens
//! wrapped envelopes. This module only speaks its HTTP API.
//!
//! # Example
//!
//! ```rust,ignore
//! use vault_courier::vault::{IssueRequest, VaultClient};
//!
//! let client = VaultClient::new("https://vault:8200")?.with_token(token);
//! let request = IssueRequest::new("api.prod.svc.cluster.local", "60s", &[], &[]);
//! let material = client.issue_certificate("pki/issue/api", &request).await?;
//! ```

pub mod client;
pub mod error;
pub mod secret_string;
pub mod types;

pub use client::{VaultClient, TOKEN_HEADER, WRAP_TTL_HEADER};
pub use error::{Result, VaultError};
pub use secret_string::SecretString;
pub use types::{
    IssueRequest, PkiData, PkiIssueSecret, Secret, SecretAuth, SecretWrapInfo, TokenCreateRequest,
};
