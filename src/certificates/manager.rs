use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::error::Result;
use super::identity::TlsIdentity;
use crate::observability::MetricsRecorder;
use crate::vault::{self, IssueRequest, PkiData, VaultClient};

/// Wait applied after a failed re-issuance before trying again.
pub const RENEWAL_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Lower bound on the scheduled renewal delay. Guards against a renewal
/// storm when the local clock runs ahead of the issuing backend.
pub const MIN_RENEWAL_DELAY: Duration = Duration::from_secs(1);

/// Something that can issue certificate material from a PKI role.
#[async_trait]
pub trait CertificateIssuer: Send + Sync + fmt::Debug {
    async fn issue(&self, issue_path: &str, request: &IssueRequest) -> vault::Result<PkiData>;
}

#[async_trait]
impl CertificateIssuer for VaultClient {
    async fn issue(&self, issue_path: &str, request: &IssueRequest) -> vault::Result<PkiData> {
        self.issue_certificate(issue_path, request).await
    }
}

/// What to ask the PKI engine for on every issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkiIssueConfig {
    /// Mount-relative path such as `pki/issue/web-server`.
    pub issue_path: String,
    pub common_name: String,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<String>,
    /// Backend duration string, e.g. `60s`.
    pub ttl: String,
}

impl PkiIssueConfig {
    pub fn issue_request(&self) -> IssueRequest {
        IssueRequest::new(&self.common_name, &self.ttl, &self.dns_names, &self.ip_addresses)
    }
}

/// Owns one TLS identity and keeps it valid.
///
/// A manager only exists once its first identity has been issued, so every
/// reader and the renewal loop always find a usable identity.
pub struct CertificateManager {
    issuer: Arc<dyn CertificateIssuer>,
    config: PkiIssueConfig,
    current: RwLock<Arc<TlsIdentity>>,
}

impl fmt::Debug for CertificateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateManager")
            .field("config", &self.config)
            .field("current", &self.current_identity())
            .finish()
    }
}

impl CertificateManager {
    /// Issue the initial identity. Failure here is a startup error.
    pub async fn new(issuer: Arc<dyn CertificateIssuer>, config: PkiIssueConfig) -> Result<Self> {
        let identity = issue_identity(issuer.as_ref(), &config).await?;

        info!(
            common_name = %config.common_name,
            serial_number = %identity.serial_number(),
            not_after = %identity.not_after(),
            "Issued initial certificate"
        );

        Ok(Self { issuer, config, current: RwLock::new(Arc::new(identity)) })
    }

    pub fn config(&self) -> &PkiIssueConfig {
        &self.config
    }

    /// The identity to present right now. Never waits on issuance.
    pub fn current_identity(&self) -> Arc<TlsIdentity> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Issue a fresh identity and swap it in. On failure the current
    /// identity stays in place.
    pub async fn reissue(&self) -> Result<()> {
        let identity = Arc::new(issue_identity(self.issuer.as_ref(), &self.config).await?);

        let previous = {
            let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, Arc::clone(&identity))
        };

        info!(
            common_name = %self.config.common_name,
            previous_serial = %previous.serial_number(),
            serial_number = %identity.serial_number(),
            not_after = %identity.not_after(),
            "Rotated certificate"
        );
        Ok(())
    }

    /// Run the renewal loop on its own task until `cancel` fires.
    pub fn spawn_renewal(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.run_renewal(cancel).await })
    }

    /// Renew at half the remaining lifetime; retry failures after
    /// [`RENEWAL_RETRY_DELAY`].
    pub async fn run_renewal(&self, cancel: CancellationToken) {
        let mut delay = renewal_delay(self.current_identity().not_after(), Utc::now());

        loop {
            info!(
                common_name = %self.config.common_name,
                renew_in_secs = delay.as_secs(),
                "Scheduled certificate renewal"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.reissue() => outcome,
            };

            MetricsRecorder::new()
                .record_certificate_rotation(&self.config.common_name, outcome.is_ok());

            delay = match outcome {
                Ok(()) => renewal_delay(self.current_identity().not_after(), Utc::now()),
                Err(e) => {
                    error!(
                        common_name = %self.config.common_name,
                        error = %e,
                        retry_in_secs = RENEWAL_RETRY_DELAY.as_secs(),
                        "Certificate renewal failed"
                    );
                    RENEWAL_RETRY_DELAY
                }
            };
        }

        info!(common_name = %self.config.common_name, "Certificate renewal loop stopped");
    }
}

async fn issue_identity(issuer: &dyn CertificateIssuer, config: &PkiIssueConfig) -> Result<TlsIdentity> {
    let data = issuer.issue(&config.issue_path, &config.issue_request()).await?;
    TlsIdentity::from_issued(&data)
}

/// Half the remaining lifetime, rounded up to whole seconds so the renewal
/// never lands before the midpoint, and never below [`MIN_RENEWAL_DELAY`].
pub fn renewal_delay(not_after: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let half = (not_after - now) / 2;
    let Ok(half) = half.to_std() else {
        return MIN_RENEWAL_DELAY;
    };

    let secs = half.as_secs() + u64::from(half.subsec_nanos() > 0);
    Duration::from_secs(secs).max(MIN_RENEWAL_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificates::identity::test_support::TestCa;
    use crate::vault::VaultError;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Issues leaves with a fixed lifetime and records when each call happened.
    #[derive(Debug)]
    struct FakeIssuer {
        ca: TestCa,
        lifetime: chrono::Duration,
        calls: Mutex<Vec<Instant>>,
        fail_after: Option<usize>,
        issued: AtomicUsize,
    }

    impl FakeIssuer {
        fn new(lifetime_secs: i64) -> Self {
            Self {
                ca: TestCa::new(),
                lifetime: chrono::Duration::seconds(lifetime_secs),
                calls: Mutex::new(Vec::new()),
                fail_after: None,
                issued: AtomicUsize::new(0),
            }
        }

        fn failing_after(mut self, successes: usize) -> Self {
            self.fail_after = Some(successes);
            self
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CertificateIssuer for FakeIssuer {
        async fn issue(&self, _path: &str, request: &IssueRequest) -> vault::Result<PkiData> {
            self.calls.lock().unwrap().push(Instant::now());
            let n = self.issued.fetch_add(1, Ordering::SeqCst);
            if self.fail_after.is_some_and(|limit| n >= limit) {
                return Err(VaultError::unexpected_status(503, "sealed"));
            }
            // Round up to a whole second: certificates carry second precision.
            let expiry = Utc::now() + self.lifetime + chrono::Duration::seconds(1);
            let expiry = Utc.timestamp_opt(expiry.timestamp(), 0).unwrap();
            Ok(self.ca.issue(&request.common_name, expiry))
        }
    }

    fn config() -> PkiIssueConfig {
        PkiIssueConfig {
            issue_path: "pki/issue/web".into(),
            common_name: "web.prod.svc.cluster.local".into(),
            dns_names: vec![],
            ip_addresses: vec!["127.0.0.1".into()],
            ttl: "60s".into(),
        }
    }

    #[test]
    fn test_renewal_delay_is_half_remaining() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let not_after = now + chrono::Duration::seconds(60);
        assert_eq!(renewal_delay(not_after, now), Duration::from_secs(30));
    }

    #[test]
    fn test_renewal_delay_rounds_up() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let not_after = now + chrono::Duration::seconds(61);
        assert_eq!(renewal_delay(not_after, now), Duration::from_secs(31));
    }

    #[test]
    fn test_renewal_delay_floors_expired_and_skewed() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(renewal_delay(now - chrono::Duration::hours(1), now), MIN_RENEWAL_DELAY);
        assert_eq!(renewal_delay(now, now), MIN_RENEWAL_DELAY);
        assert_eq!(
            renewal_delay(now + chrono::Duration::milliseconds(300), now),
            MIN_RENEWAL_DELAY
        );
    }

    #[tokio::test]
    async fn test_construction_fails_when_issuance_fails() {
        let issuer = Arc::new(FakeIssuer::new(60).failing_after(0));
        let err = CertificateManager::new(issuer, config()).await.unwrap_err();
        assert!(err.is_backend_failure());
    }

    #[tokio::test]
    async fn test_reissue_swaps_identity() {
        let issuer = Arc::new(FakeIssuer::new(60));
        let manager = CertificateManager::new(issuer, config()).await.unwrap();

        let before = manager.current_identity();
        manager.reissue().await.unwrap();
        let after = manager.current_identity();

        assert_ne!(before.serial_number(), after.serial_number());
        // Readers holding the old identity keep a consistent value.
        assert!(before.chain_pem().contains("BEGIN CERTIFICATE"));
    }

    #[tokio::test]
    async fn test_failed_reissue_keeps_current_identity() {
        let issuer = Arc::new(FakeIssuer::new(60).failing_after(1));
        let manager = CertificateManager::new(issuer, config()).await.unwrap();

        let before = manager.current_identity();
        assert!(manager.reissue().await.is_err());
        assert!(Arc::ptr_eq(&before, &manager.current_identity()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_readers_never_see_mixed_identity() {
        let issuer = Arc::new(FakeIssuer::new(3600));
        let manager = Arc::new(CertificateManager::new(issuer, config()).await.unwrap());
        let stop = CancellationToken::new();

        let mut readers = Vec::new();
        for _ in 0..4 {
            let manager = Arc::clone(&manager);
            let stop = stop.clone();
            readers.push(tokio::spawn(async move {
                let mut observed = 0usize;
                while !stop.is_cancelled() {
                    let identity = manager.current_identity();
                    let key = identity.certified_key();
                    // The prebuilt key pairs with the same leaf the PEM chain holds.
                    let leaf_pem = identity.chain_pem().split("-----END CERTIFICATE-----").next().unwrap();
                    let (_, parsed) = x509_parser::pem::parse_x509_pem(
                        format!("{leaf_pem}-----END CERTIFICATE-----\n").as_bytes(),
                    )
                    .unwrap();
                    assert_eq!(key.cert[0].as_ref(), parsed.contents.as_slice());
                    observed += 1;
                    tokio::task::yield_now().await;
                }
                observed
            }));
        }

        for _ in 0..10 {
            manager.reissue().await.unwrap();
        }
        stop.cancel();

        for reader in readers {
            assert!(reader.await.unwrap() > 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_renewal_never_fires_before_half_lifetime() {
        let issuer = Arc::new(FakeIssuer::new(20));
        let manager = Arc::new(
            CertificateManager::new(Arc::clone(&issuer) as Arc<dyn CertificateIssuer>, config())
                .await
                .unwrap(),
        );
        let cancel = CancellationToken::new();
        let handle = manager.spawn_renewal(cancel.clone());

        tokio::time::sleep(Duration::from_secs(60)).await;
        cancel.cancel();
        handle.await.unwrap();

        let calls = issuer.calls();
        assert!(calls.len() >= 3, "expected several renewals, got {}", calls.len());
        for pair in calls.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(10));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_renewal_retries_after_fixed_delay() {
        let issuer = Arc::new(FakeIssuer::new(20).failing_after(1));
        let manager = Arc::new(
            CertificateManager::new(Arc::clone(&issuer) as Arc<dyn CertificateIssuer>, config())
                .await
                .unwrap(),
        );
        let cancel = CancellationToken::new();
        let handle = manager.spawn_renewal(cancel.clone());

        tokio::time::sleep(Duration::from_secs(45)).await;
        cancel.cancel();
        handle.await.unwrap();

        let calls = issuer.calls();
        assert!(calls.len() >= 3);
        for pair in calls[1..].windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= RENEWAL_RETRY_DELAY && gap < RENEWAL_RETRY_DELAY + Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_loop_promptly() {
        let issuer = Arc::new(FakeIssuer::new(3600));
        let manager = Arc::new(CertificateManager::new(issuer, config()).await.unwrap());
        let cancel = CancellationToken::new();
        let handle = manager.spawn_renewal(cancel.clone());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
