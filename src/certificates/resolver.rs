use std::fmt;
use std::sync::Arc;

use rustls::client::ResolvesClientCert;
use rustls::server::{ClientHello, ResolvesServerCert, WebPkiClientVerifier};
use rustls::sign::CertifiedKey;
use rustls::{ClientConfig, ServerConfig, SignatureScheme};

use super::error::{CertificateError, Result};
use super::manager::CertificateManager;

/// Hands the manager's current identity to every server-side handshake.
pub struct ServerCertResolver {
    manager: Arc<CertificateManager>,
}

impl ServerCertResolver {
    pub fn new(manager: Arc<CertificateManager>) -> Self {
        Self { manager }
    }
}

impl fmt::Debug for ServerCertResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCertResolver")
            .field("common_name", &self.manager.config().common_name)
            .finish()
    }
}

impl ResolvesServerCert for ServerCertResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(self.manager.current_identity().certified_key())
    }
}

/// Presents the manager's current identity on every client-side handshake.
pub struct ClientCertResolver {
    manager: Arc<CertificateManager>,
}

impl ClientCertResolver {
    pub fn new(manager: Arc<CertificateManager>) -> Self {
        Self { manager }
    }
}

impl fmt::Debug for ClientCertResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCertResolver")
            .field("common_name", &self.manager.config().common_name)
            .finish()
    }
}

impl ResolvesClientCert for ClientCertResolver {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        Some(self.manager.current_identity().certified_key())
    }

    fn has_certs(&self) -> bool {
        true
    }
}

/// Server configuration that requires client certificates chained to the
/// CA that issued this manager's identity.
pub fn mutual_tls_server_config(manager: Arc<CertificateManager>) -> Result<ServerConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let roots = Arc::new(manager.current_identity().ca_root_store()?);

    let verifier = WebPkiClientVerifier::builder_with_provider(roots, Arc::clone(&provider))
        .build()
        .map_err(|err| CertificateError::TlsConfig(rustls::Error::General(err.to_string())))?;

    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_client_cert_verifier(verifier)
        .with_cert_resolver(Arc::new(ServerCertResolver::new(manager)));
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(config)
}

/// Client configuration that trusts only the issuing CA and presents this
/// manager's identity when asked.
pub fn mutual_tls_client_config(manager: Arc<CertificateManager>) -> Result<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let roots = manager.current_identity().ca_root_store()?;

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_client_cert_resolver(Arc::new(ClientCertResolver::new(manager)));
    Ok(config)
}
