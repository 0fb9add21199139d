//! HTTP client for the secret backend.
//!
//! One `VaultClient` is built per process role and handed explicitly to the
//! components that need it. It carries the backend address and, optionally,
//! the bearer credential sent as `X-Vault-Token`.

use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::error::{Result, VaultError};
use super::secret_string::SecretString;
use super::types::{
    IssueRequest, PkiData, PkiIssueSecret, Secret, SecretAuth, SecretWrapInfo, TokenCreateRequest,
};

/// Header carrying the bearer credential.
pub const TOKEN_HEADER: &str = "X-Vault-Token";

/// Header asking the backend to wrap the response for the given TTL.
pub const WRAP_TTL_HEADER: &str = "X-Vault-Wrap-TTL";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the subset of the backend API this system uses: PKI issuance,
/// token creation with response wrapping, self-renewal and unwrapping.
#[derive(Clone)]
pub struct VaultClient {
    http: reqwest::Client,
    address: String,
    token: Option<SecretString>,
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("address", &self.address)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl VaultClient {
    /// Create a client for the backend at `address` with no bearer credential.
    pub fn new(address: impl Into<String>) -> Result<Self> {
        Self::with_timeout(address, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client whose requests give up after `timeout`.
    pub fn with_timeout(address: impl Into<String>, timeout: Duration) -> Result<Self> {
        let address = address.into().trim().trim_end_matches('/').to_string();
        if address.is_empty() {
            return Err(VaultError::config_error("backend address cannot be empty"));
        }

        let http = reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
            VaultError::config_error(format!("Failed to build backend HTTP client: {}", e))
        })?;

        Ok(Self { http, address, token: None })
    }

    /// Attach the bearer credential used for authenticated calls.
    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    /// Backend address without a trailing slash.
    pub fn address(&self) -> &str {
        &self.address
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path.trim_start_matches('/'))
    }

    fn bearer(&self, operation: &str) -> Result<&SecretString> {
        self.token.as_ref().ok_or_else(|| VaultError::missing_token(operation))
    }

    /// Send a request and decode a 200 body, surfacing anything else as the
    /// raw response text.
    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            warn!(status = status.as_u16(), "Backend request returned non-200 status");
            return Err(VaultError::unexpected_status(status.as_u16(), body));
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// Issue a certificate from the PKI mount at `issue_path`
    /// (e.g. `pki/issue/web-server`).
    pub async fn issue_certificate(
        &self,
        issue_path: &str,
        request: &IssueRequest,
    ) -> Result<PkiData> {
        let token = self.bearer("certificate issuance")?;
        debug!(issue_path = %issue_path, common_name = %request.common_name, "Requesting certificate");

        let secret: PkiIssueSecret = Self::send(
            self.http
                .post(self.url(issue_path))
                .header(TOKEN_HEADER, token.expose_secret())
                .json(request),
        )
        .await?;

        Ok(secret.data)
    }

    /// Renew the lease of the client's own token.
    pub async fn renew_self(&self) -> Result<SecretAuth> {
        let token = self.bearer("token renewal")?;

        let secret: Secret = Self::send(
            self.http
                .post(self.url("auth/token/renew-self"))
                .header(TOKEN_HEADER, token.expose_secret()),
        )
        .await?;

        secret.auth.ok_or_else(|| VaultError::missing_field("auth"))
    }

    /// Create a child token and return only the wrapping envelope for it.
    pub async fn create_wrapped_token(
        &self,
        request: &TokenCreateRequest,
        wrap_ttl: &str,
    ) -> Result<SecretWrapInfo> {
        let token = self.bearer("token creation")?;

        let secret: Secret = Self::send(
            self.http
                .post(self.url("auth/token/create"))
                .header(TOKEN_HEADER, token.expose_secret())
                .header(WRAP_TTL_HEADER, wrap_ttl)
                .json(request),
        )
        .await?;

        secret.wrap_info.ok_or_else(|| VaultError::missing_field("wrap_info"))
    }

    /// Reveal the payload behind a wrapping token.
    ///
    /// The request body is empty: presenting the wrapping token as the bearer
    /// tells the backend which envelope to open.
    pub async fn unwrap(&self, wrapping_token: &SecretString) -> Result<Secret> {
        Self::send(
            self.http
                .post(self.url("sys/wrapping/unwrap"))
                .header(TOKEN_HEADER, wrapping_token.expose_secret()),
        )
        .await
    }
}
