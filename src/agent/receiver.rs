use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::any;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::store::{CredentialStore, StoreError};
use crate::api::ApiError;
use crate::observability::MetricsRecorder;
use crate::vault::{self, Secret, SecretString, SecretWrapInfo, VaultClient};

/// Opens a wrapping envelope.
#[async_trait]
pub trait Unwrapper: Send + Sync + fmt::Debug {
    async fn unwrap(&self, wrapping_token: &SecretString) -> vault::Result<Secret>;
}

#[async_trait]
impl Unwrapper for VaultClient {
    async fn unwrap(&self, wrapping_token: &SecretString) -> vault::Result<Secret> {
        VaultClient::unwrap(self, wrapping_token).await
    }
}

#[derive(Debug, Clone)]
pub struct ReceiverState {
    pub store: Arc<CredentialStore>,
    pub unwrapper: Arc<dyn Unwrapper>,
    pub metrics: MetricsRecorder,
}

/// One-shot receiver: any method on `/` with a JSON envelope body.
pub fn router(state: ReceiverState) -> Router {
    Router::new()
        .route("/", any(receive_envelope))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn receive_envelope(
    State(state): State<ReceiverState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let outcome = unwrap_and_persist(&state, &body).await;
    let status = match &outcome {
        Ok(status) => *status,
        Err(e) => e.status_code(),
    };
    state.metrics.record_unwrap(status.as_u16());
    outcome
}

async fn unwrap_and_persist(state: &ReceiverState, body: &[u8]) -> Result<StatusCode, ApiError> {
    let path = state.store.path().display().to_string();

    if state.store.exists().await {
        warn!(path = %path, "Token file already exists, refusing delivery");
        return Err(ApiError::conflict(format!("token file {} already exists", path)));
    }

    let envelope: SecretWrapInfo = serde_json::from_slice(body).map_err(|e| {
        error!(error = %e, "Could not parse wrapped token");
        ApiError::internal("error parsing wrapped token")
    })?;

    info!(
        wrapped_accessor = %envelope.wrapped_accessor,
        ttl = envelope.ttl,
        "Unwrapping delivered token"
    );

    let secret = state.unwrapper.unwrap(&envelope.token).await.map_err(|e| {
        error!(error = %e, "Unwrapping token failed");
        ApiError::internal("error unwrapping token")
    })?;

    match state.store.persist(&secret).await {
        Ok(()) => Ok(StatusCode::OK),
        Err(StoreError::AlreadyExists { .. }) => {
            warn!(path = %path, "Lost race creating token file");
            Err(ApiError::conflict(format!("token file {} already exists", path)))
        }
        Err(e) => {
            error!(error = %e, "Writing token file failed");
            Err(ApiError::internal("error writing token file"))
        }
    }
}
