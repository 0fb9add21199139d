use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{info, warn};

use crate::observability::MetricsRecorder;
use crate::vault::SecretWrapInfo;

const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("error pushing wrapped token to {url}: {message}")]
    Transport { url: String, message: String },

    #[error("error pushing wrapped token to {url}: status {status}: {body}")]
    Rejected { url: String, status: u16, body: String },

    #[error("delivery client configuration error: {message}")]
    Config { message: String },
}

/// Pushes a wrapping envelope to a workload.
#[async_trait]
pub trait EnvelopeDelivery: Send + Sync + fmt::Debug {
    async fn deliver(&self, pod_ip: &str, envelope: &SecretWrapInfo) -> Result<(), DeliveryError>;
}

/// Delivers envelopes as JSON `POST`s to the agent listening on the pod IP.
#[derive(Debug, Clone)]
pub struct HttpDelivery {
    http: reqwest::Client,
    port: u16,
}

impl HttpDelivery {
    pub fn new(port: u16) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_DELIVERY_TIMEOUT)
            .build()
            .map_err(|e| DeliveryError::Config { message: e.to_string() })?;
        Ok(Self { http, port })
    }

    /// `http://{ip}`, with the port only when it is not 80.
    pub fn target_url(&self, pod_ip: &str) -> String {
        let host = match pod_ip.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("[{}]", ip),
            _ => pod_ip.to_string(),
        };
        if self.port == 80 {
            format!("http://{}", host)
        } else {
            format!("http://{}:{}", host, self.port)
        }
    }
}

#[async_trait]
impl EnvelopeDelivery for HttpDelivery {
    async fn deliver(&self, pod_ip: &str, envelope: &SecretWrapInfo) -> Result<(), DeliveryError> {
        let url = self.target_url(pod_ip);

        let response = self
            .http
            .post(&url)
            .json(envelope)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport { url: url.clone(), message: e.to_string() })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected { url, status: status.as_u16(), body });
        }
        Ok(())
    }
}

/// Deliver on a detached task. Failures are logged and counted, never retried.
pub fn spawn_delivery(
    delivery: Arc<dyn EnvelopeDelivery>,
    pod_name: String,
    pod_ip: String,
    envelope: SecretWrapInfo,
    metrics: MetricsRecorder,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match delivery.deliver(&pod_ip, &envelope).await {
            Ok(()) => {
                metrics.record_envelope_delivery(true);
                info!(pod = %pod_name, pod_ip = %pod_ip, "Pushed wrapped token to workload");
            }
            Err(e) => {
                metrics.record_envelope_delivery(false);
                warn!(pod = %pod_name, pod_ip = %pod_ip, error = %e, "Wrapped token delivery failed");
            }
        }
    })
}
