//! Wire types for the secret backend's HTTP API.
//!
//! These mirror the backend's JSON shapes. `Secret` is also the on-disk format
//! of the persisted credential file.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::secret_string::SecretString;

/// Generic secret envelope returned by most backend endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Secret {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub lease_id: String,
    #[serde(default)]
    pub lease_duration: u64,
    #[serde(default)]
    pub renewable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrap_info: Option<SecretWrapInfo>,
    #[serde(default)]
    pub auth: Option<SecretAuth>,
}

/// Token section of a secret.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretAuth {
    pub client_token: SecretString,
    #[serde(default)]
    pub accessor: String,
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub lease_duration: u64,
    #[serde(default)]
    pub renewable: bool,
}

/// Single-use reference to a wrapped payload.
///
/// This is the only artifact that travels from the controller to a workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretWrapInfo {
    pub token: SecretString,
    pub ttl: u64,
    pub creation_time: DateTime<Utc>,
    #[serde(default)]
    pub wrapped_accessor: String,
}

/// Body of `POST /v1/auth/token/create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCreateRequest {
    pub policies: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub display_name: String,
    pub period: String,
    pub no_parent: bool,
    pub ttl: String,
}

/// Body of `POST /v1/{issue_path}` on a PKI mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRequest {
    pub common_name: String,
    pub ttl: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_names: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_sans: Option<String>,
}

impl IssueRequest {
    /// Build an issuance body, comma-joining the SAN lists and omitting empty ones.
    pub fn new(
        common_name: impl Into<String>,
        ttl: impl Into<String>,
        dns_names: &[String],
        ip_addresses: &[String],
    ) -> Self {
        let join = |values: &[String]| {
            let joined = values
                .iter()
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .collect::<Vec<_>>()
                .join(",");
            (!joined.is_empty()).then_some(joined)
        };

        Self {
            common_name: common_name.into(),
            ttl: ttl.into(),
            alt_names: join(dns_names),
            ip_sans: join(ip_addresses),
        }
    }
}

/// Response of a PKI issue call.
#[derive(Debug, Clone, Deserialize)]
pub struct PkiIssueSecret {
    #[serde(default)]
    pub request_id: String,
    pub data: PkiData,
}

/// Certificate material returned by the PKI engine.
#[derive(Debug, Clone, Deserialize)]
pub struct PkiData {
    pub certificate: String,
    pub issuing_ca: String,
    pub private_key: SecretString,
    #[serde(default)]
    pub private_key_type: String,
    #[serde(default)]
    pub serial_number: String,
}
