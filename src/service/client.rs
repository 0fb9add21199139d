use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::certificates::{mutual_tls_client_config, CertificateManager};
use crate::errors::{Error, Result};

/// Time between calls to the remote service.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept `host:port` as well as full URLs; bare addresses are HTTPS.
pub fn normalize_remote_addr(remote_addr: &str) -> String {
    let trimmed = remote_addr.trim();
    if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Client built from the manager's CA bundle. The certificate itself is
/// resolved on each handshake.
fn mutual_tls_client(manager: &Arc<CertificateManager>) -> Result<reqwest::Client> {
    let tls = mutual_tls_client_config(Arc::clone(manager))?;
    reqwest::Client::builder()
        .use_preconfigured_tls(tls)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| Error::transport(format!("Failed to build mTLS client: {}", e)))
}

/// GET `remote_addr` every `interval` presenting the current client
/// certificate, and log the response body. Errors are logged and the loop
/// keeps going until `cancel` fires.
pub async fn run_client(
    manager: Arc<CertificateManager>,
    remote_addr: &str,
    interval: Duration,
    cancel: CancellationToken,
) {
    let url = normalize_remote_addr(remote_addr);
    info!(remote = %url, interval_secs = interval.as_secs(), "Starting mTLS client");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        // Rebuilt per call so a rotated CA bundle and a fresh handshake are
        // picked up without connection reuse.
        let client = match mutual_tls_client(&manager) {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "Could not prepare mTLS client");
                continue;
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = fetch(&client, &url) => outcome,
        };

        match outcome {
            Ok(body) => info!(remote = %url, body = %body, "Remote service replied"),
            Err(e) => warn!(remote = %url, error = %e, "Remote service call failed"),
        }
    }

    debug!(remote = %url, "mTLS client stopped");
}

async fn fetch(client: &reqwest::Client, url: &str) -> std::result::Result<String, reqwest::Error> {
    client.get(url).send().await?.text().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_remote_addr() {
        assert_eq!(normalize_remote_addr("web.prod.svc:443"), "https://web.prod.svc:443");
        assert_eq!(normalize_remote_addr(" https://web:8443 "), "https://web:8443");
        assert_eq!(normalize_remote_addr("http://web"), "http://web");
    }
}
