use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::observability::MetricsRecorder;
use crate::vault::{self, Secret, SecretAuth, SecretString, VaultClient};

/// Fixed wait after a failed renewal.
pub const RENEWAL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Floor for the success delay so a zero-length lease cannot spin.
pub const MIN_RENEWAL_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("could not read credential file {path}: {source}")]
    ReadCredential {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse credential file {path}: {source}")]
    ParseCredential {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("credential file {path} does not contain an auth section")]
    MissingAuth { path: PathBuf },

    #[error(transparent)]
    Backend(#[from] vault::VaultError),
}

/// The bearer credential a process authenticates with.
#[derive(Debug, Clone)]
pub struct BearerCredential {
    pub token: SecretString,
    pub lease_duration: u64,
    pub renewable: bool,
    pub policies: Vec<String>,
    /// Free-form metadata the minting side attached (pod name, namespace...).
    pub metadata: BTreeMap<String, String>,
}

impl BearerCredential {
    /// Read and parse a persisted credential file once.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LeaseError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Reading credential file");

        let raw = std::fs::read(path)
            .map_err(|source| LeaseError::ReadCredential { path: path.to_path_buf(), source })?;
        let secret: Secret = serde_json::from_slice(&raw)
            .map_err(|source| LeaseError::ParseCredential { path: path.to_path_buf(), source })?;
        let auth = secret.auth.ok_or_else(|| LeaseError::MissingAuth { path: path.to_path_buf() })?;

        Ok(Self::from(auth))
    }
}

impl From<SecretAuth> for BearerCredential {
    fn from(auth: SecretAuth) -> Self {
        Self {
            token: auth.client_token,
            lease_duration: auth.lease_duration,
            renewable: auth.renewable,
            policies: auth.policies,
            metadata: auth.metadata.unwrap_or_default(),
        }
    }
}

/// Renews the lease of the credential the backend client holds.
#[async_trait]
pub trait LeaseBackend: Send + Sync + fmt::Debug {
    /// Renew and return the new lease duration in seconds.
    async fn renew(&self) -> vault::Result<u64>;
}

#[async_trait]
impl LeaseBackend for VaultClient {
    async fn renew(&self) -> vault::Result<u64> {
        Ok(self.renew_self().await?.lease_duration)
    }
}

/// Keeps one bearer credential's lease alive.
#[derive(Debug, Clone)]
pub struct LeaseRenewer {
    backend: Arc<dyn LeaseBackend>,
    retry_delay: Duration,
}

impl LeaseRenewer {
    pub fn new(backend: Arc<dyn LeaseBackend>) -> Self {
        Self { backend, retry_delay: RENEWAL_RETRY_DELAY }
    }

    /// Load the credential at `path` and build a backend client carrying it.
    /// The client is returned too so callers can issue certificates with
    /// the same credential.
    pub fn from_credential_file(
        path: impl AsRef<Path>,
        vault_addr: &str,
    ) -> Result<(Self, Arc<VaultClient>), LeaseError> {
        let credential = BearerCredential::load(path)?;
        info!(
            policies = ?credential.policies,
            metadata = ?credential.metadata,
            renewable = credential.renewable,
            "Loaded bearer credential"
        );
        let client = Arc::new(VaultClient::new(vault_addr)?.with_token(credential.token));
        Ok((Self::new(Arc::clone(&client) as Arc<dyn LeaseBackend>), client))
    }

    /// Start renewing on a background task.
    pub fn spawn(self) -> RenewalHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cancel.clone()));
        RenewalHandle { cancel, task }
    }

    /// Renew until `cancel` fires. Failures wait the fixed retry delay and
    /// never shift the success schedule.
    pub async fn run(self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.backend.renew() => outcome,
            };

            MetricsRecorder::new().record_lease_renewal(outcome.is_ok());

            let delay = match outcome {
                Ok(lease_duration) => {
                    let delay = Duration::from_secs(lease_duration / 2).max(MIN_RENEWAL_DELAY);
                    info!(
                        lease_duration,
                        next_renewal_secs = delay.as_secs(),
                        "Renewed bearer credential"
                    );
                    delay
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_in_secs = self.retry_delay.as_secs(),
                        "Bearer credential renewal failed"
                    );
                    self.retry_delay
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!("Lease renewal loop stopped");
    }
}

/// Handle to a running renewal loop.
#[derive(Debug)]
pub struct RenewalHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RenewalHandle {
    /// Ask the loop to exit and wait until it has.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Lease renewal task ended abnormally");
        }
        info!("Lease renewal stopped");
    }
}
