//! Mutual TLS between the service roles, backed by a fake PKI engine.
//!
//! - a client presenting an issued certificate is served
//! - a client without a certificate is refused during the handshake
//! - a client stuck in its handshake does not hold up the others
//! - rotation changes the certificate new handshakes see without a restart

mod mtls {
    pub mod support;
}

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::{CertificateDer, ServerName};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;

use mtls::support::{start_backend, TestPki, SERVICE_TOKEN};
use vault_courier::api::{bind, serve_tls};
use vault_courier::certificates::{
    mutual_tls_client_config, mutual_tls_server_config, CertificateIssuer, CertificateManager,
    PkiIssueConfig,
};
use vault_courier::service::server::router;
use vault_courier::vault::VaultClient;

fn server_issue_config() -> PkiIssueConfig {
    PkiIssueConfig {
        issue_path: "pki/issue/server".into(),
        common_name: "web.prod.svc.cluster.local".into(),
        dns_names: vec!["web".into(), "localhost".into()],
        ip_addresses: vec!["127.0.0.1".into()],
        ttl: "60s".into(),
    }
}

fn client_issue_config() -> PkiIssueConfig {
    PkiIssueConfig {
        issue_path: "pki/issue/client".into(),
        common_name: "10.0.0.9.prod.pod.cluster.local".into(),
        dns_names: Vec::new(),
        ip_addresses: Vec::new(),
        ttl: "60s".into(),
    }
}

struct Harness {
    pki: Arc<TestPki>,
    _backend: wiremock::MockServer,
    server: Arc<CertificateManager>,
    client: Arc<CertificateManager>,
    addr: SocketAddr,
    cancel: CancellationToken,
}

impl Harness {
    async fn start() -> Self {
        let pki = TestPki::new();
        let backend = start_backend(Arc::clone(&pki)).await;
        let issuer: Arc<dyn CertificateIssuer> =
            Arc::new(VaultClient::new(backend.uri()).unwrap().with_token(SERVICE_TOKEN.into()));

        let server =
            Arc::new(CertificateManager::new(Arc::clone(&issuer), server_issue_config()).await.unwrap());
        let client =
            Arc::new(CertificateManager::new(Arc::clone(&issuer), client_issue_config()).await.unwrap());

        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = mutual_tls_server_config(Arc::clone(&server)).unwrap();
        let cancel = CancellationToken::new();
        tokio::spawn(serve_tls(listener, config, router("web"), cancel.clone()));

        Self { pki, _backend: backend, server, client, addr, cancel }
    }

    fn https_url(&self) -> String {
        format!("https://127.0.0.1:{}/", self.addr.port())
    }

    /// Raw handshake with the client identity; returns the leaf the server
    /// presented.
    async fn handshake(&self) -> CertificateDer<'static> {
        let config = mutual_tls_client_config(Arc::clone(&self.client)).unwrap();
        let connector = TlsConnector::from(Arc::new(config));
        let tcp = TcpStream::connect(self.addr).await.unwrap();
        let server_name = ServerName::try_from("localhost").unwrap();
        let mut tls = connector.connect(server_name, tcp).await.unwrap();

        tls.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = Vec::new();
        // The server may close without close_notify; the bytes read so far
        // are what matters.
        let _ = tls.read_to_end(&mut response).await;
        assert!(String::from_utf8_lossy(&response).contains("Hello from web service"));

        let (_, connection) = tls.get_ref();
        connection.peer_certificates().unwrap()[0].clone().into_owned()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[tokio::test]
async fn test_client_with_issued_certificate_is_served() {
    let harness = Harness::start().await;

    let tls = mutual_tls_client_config(Arc::clone(&harness.client)).unwrap();
    let client = reqwest::Client::builder().use_preconfigured_tls(tls).build().unwrap();

    let body = client.get(harness.https_url()).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "Hello from web service");
    assert_eq!(harness.pki.issued(), 2);
}

#[tokio::test]
async fn test_client_without_certificate_is_refused() {
    let harness = Harness::start().await;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let roots = harness.server.current_identity().ca_root_store().unwrap();
    let tls = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let client = reqwest::Client::builder().use_preconfigured_tls(tls).build().unwrap();

    assert!(client.get(harness.https_url()).send().await.is_err());
}

#[tokio::test]
async fn test_stalled_handshake_does_not_block_other_clients() {
    let harness = Harness::start().await;

    // Connects but never sends a ClientHello.
    let _stalled = TcpStream::connect(harness.addr).await.unwrap();

    let leaf = tokio::time::timeout(Duration::from_secs(3), harness.handshake())
        .await
        .expect("second client waited behind the stalled one");
    assert_eq!(leaf, harness.server.current_identity().certified_key().cert[0]);
}

#[tokio::test]
async fn test_rotation_is_seen_by_new_handshakes() {
    let harness = Harness::start().await;

    let before = harness.handshake().await;
    assert_eq!(before, harness.server.current_identity().certified_key().cert[0]);

    harness.server.reissue().await.unwrap();
    harness.client.reissue().await.unwrap();

    let after = harness.handshake().await;
    assert_ne!(before, after);
    assert_eq!(after, harness.server.current_identity().certified_key().cert[0]);
    assert_eq!(harness.pki.issued(), 4);
}
