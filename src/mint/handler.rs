use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::delivery::{spawn_delivery, EnvelopeDelivery};
use crate::api::ApiError;
use crate::observability::MetricsRecorder;
use crate::vault::{self, SecretWrapInfo, TokenCreateRequest, VaultClient};
use crate::workload::{is_dns_label, is_dns_subdomain, Workload, WorkloadDirectory};

/// Namespace used when a request leaves it out.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Creates a scoped child token and returns only its wrapping envelope.
#[async_trait]
pub trait TokenMinter: Send + Sync + fmt::Debug {
    async fn mint(&self, request: &TokenCreateRequest) -> vault::Result<SecretWrapInfo>;
}

/// Mints through the backend with a fixed wrap TTL.
#[derive(Debug, Clone)]
pub struct VaultMinter {
    client: Arc<VaultClient>,
    wrap_ttl: String,
}

impl VaultMinter {
    pub fn new(client: Arc<VaultClient>, wrap_ttl: impl Into<String>) -> Self {
        Self { client, wrap_ttl: wrap_ttl.into() }
    }
}

#[async_trait]
impl TokenMinter for VaultMinter {
    async fn mint(&self, request: &TokenCreateRequest) -> vault::Result<SecretWrapInfo> {
        self.client.create_wrapped_token(request, &self.wrap_ttl).await
    }
}

/// Collaborators of the credential mint. Each is a trait object so the
/// handler can be driven by fakes.
#[derive(Debug, Clone)]
pub struct MintState {
    pub directory: Arc<dyn WorkloadDirectory>,
    pub minter: Arc<dyn TokenMinter>,
    pub delivery: Arc<dyn EnvelopeDelivery>,
    pub metrics: MetricsRecorder,
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Router exposing `POST /token`.
pub fn router(state: MintState) -> Router {
    Router::new()
        .route("/token", post(request_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the token creation body for a resolved workload.
pub fn token_request_for(workload: &Workload, policies: Vec<String>) -> TokenCreateRequest {
    let ttl = workload.ttl().to_string();
    TokenCreateRequest {
        policies,
        metadata: workload.token_metadata(),
        display_name: workload.name.clone(),
        period: ttl.clone(),
        no_parent: true,
        ttl,
    }
}

async fn request_token(
    State(state): State<MintState>,
    Query(query): Query<TokenQuery>,
) -> Result<StatusCode, ApiError> {
    let outcome = mint_and_dispatch(&state, query).await;
    let status = match &outcome {
        Ok(status) => *status,
        Err(e) => e.status_code(),
    };
    state.metrics.record_token_request(status.as_u16());
    outcome
}

async fn mint_and_dispatch(state: &MintState, query: TokenQuery) -> Result<StatusCode, ApiError> {
    let name = query.name.map(|n| n.trim().to_string()).unwrap_or_default();
    if name.is_empty() {
        warn!("Token request with empty name");
        return Err(ApiError::bad_request("missing or empty name parameter"));
    }

    let namespace = query
        .namespace
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| {
            info!(pod = %name, "Token request without namespace, using default");
            DEFAULT_NAMESPACE.to_string()
        });

    if !is_dns_subdomain(&name) || !is_dns_label(&namespace) {
        warn!(pod = %name, namespace = %namespace, "Token request with invalid workload reference");
        return Err(ApiError::bad_request("invalid name or namespace parameter"));
    }

    info!(pod = %name, namespace = %namespace, "Token request received");

    let workload = state.directory.lookup(&namespace, &name).await.map_err(|e| {
        error!(pod = %name, namespace = %namespace, error = %e, "Workload lookup failed");
        ApiError::internal(format!("error during pod ({}) lookup", name))
    })?;

    if workload.pod_ip.is_empty() {
        warn!(pod = %name, namespace = %namespace, "Workload has no pod IP");
        return Err(ApiError::precondition_failed("missing or empty pod IP"));
    }

    let Some(policies) = workload.policies() else {
        warn!(pod = %name, namespace = %namespace, "Workload has no policies annotation");
        return Err(ApiError::precondition_failed(
            "missing or empty vaultproject.io/policies annotation",
        ));
    };

    let request = token_request_for(&workload, policies);
    let envelope = state.minter.mint(&request).await.map_err(|e| {
        error!(pod = %name, namespace = %namespace, error = %e, "Creating wrapped token failed");
        ApiError::internal("error creating wrapped token")
    })?;

    info!(
        pod = %name,
        namespace = %namespace,
        policies = ?request.policies,
        ttl = %request.ttl,
        "Minted wrapped token"
    );

    spawn_delivery(
        Arc::clone(&state.delivery),
        workload.name.clone(),
        workload.pod_ip.clone(),
        envelope,
        state.metrics,
    );

    Ok(StatusCode::ACCEPTED)
}
