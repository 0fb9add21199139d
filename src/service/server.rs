use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::{bind, serve_tls};
use crate::certificates::{mutual_tls_server_config, CertificateManager};

#[derive(Debug, Clone)]
struct GreetingState {
    service_name: Arc<str>,
}

/// `GET /` answers `Hello from {service} service`.
pub fn router(service_name: &str) -> Router {
    Router::new()
        .route("/", get(greet))
        .layer(TraceLayer::new_for_http())
        .with_state(GreetingState { service_name: Arc::from(service_name) })
}

async fn greet(State(state): State<GreetingState>) -> String {
    format!("Hello from {} service", state.service_name)
}

/// Serve the greeting over HTTPS, requiring client certificates issued by
/// the same CA as the server identity, until `cancel` fires.
pub async fn run_server(
    manager: Arc<CertificateManager>,
    addr: SocketAddr,
    service_name: &str,
    cancel: CancellationToken,
) -> crate::Result<()> {
    let config = mutual_tls_server_config(manager)?;
    let listener = bind(addr).await?;

    info!(service = %service_name, address = %addr, "Starting mTLS server");
    serve_tls(listener, config, router(service_name), cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_greeting_names_service() {
        let response = router("web")
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Hello from web service");
    }
}
