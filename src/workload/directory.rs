use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use super::pod::{Pod, Workload};

/// Default address of a local `kubectl proxy`.
pub const DEFAULT_KUBE_API: &str = "http://127.0.0.1:8001";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("workload lookup for {namespace}/{name} failed: {message}")]
    Lookup { namespace: String, name: String, message: String },

    #[error("workload lookup for {namespace}/{name} returned status {status}")]
    UnexpectedStatus { namespace: String, name: String, status: u16 },

    #[error("workload metadata for {namespace}/{name} could not be parsed: {source}")]
    Parse {
        namespace: String,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid workload reference {namespace}/{name}")]
    InvalidName { namespace: String, name: String },

    #[error("workload directory configuration error: {message}")]
    Config { message: String },
}

impl DirectoryError {
    pub fn lookup(namespace: &str, name: &str, message: impl Into<String>) -> Self {
        Self::Lookup { namespace: namespace.to_string(), name: name.to_string(), message: message.into() }
    }
}

const MAX_LABEL_LEN: usize = 63;
const MAX_SUBDOMAIN_LEN: usize = 253;

/// Whether `s` is an RFC 1123 label: lowercase alphanumerics and `-`,
/// starting and ending with an alphanumeric. Namespaces must be labels.
pub fn is_dns_label(s: &str) -> bool {
    let bytes = s.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            bytes.len() <= MAX_LABEL_LEN
                && is_label_edge(*first)
                && is_label_edge(*last)
                && bytes.iter().all(|b| is_label_edge(*b) || *b == b'-')
        }
        _ => false,
    }
}

/// Whether `s` is an RFC 1123 subdomain (dot-separated labels). Pod names
/// must be subdomains.
pub fn is_dns_subdomain(s: &str) -> bool {
    s.len() <= MAX_SUBDOMAIN_LEN && s.split('.').all(is_dns_label)
}

fn is_label_edge(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}

/// Resolves a workload's identity by name. Looked up fresh every call.
#[async_trait]
pub trait WorkloadDirectory: Send + Sync + fmt::Debug {
    async fn lookup(&self, namespace: &str, name: &str) -> Result<Workload, DirectoryError>;
}

/// Reads pod objects from the orchestrator's API (typically through
/// `kubectl proxy`).
#[derive(Debug, Clone)]
pub struct KubeApiDirectory {
    http: reqwest::Client,
    api_base: String,
}

impl KubeApiDirectory {
    pub fn new(api_base: impl Into<String>) -> Result<Self, DirectoryError> {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        if api_base.is_empty() {
            return Err(DirectoryError::Config { message: "API address cannot be empty".into() });
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DirectoryError::Config { message: e.to_string() })?;
        Ok(Self { http, api_base })
    }

    fn pod_url(&self, namespace: &str, name: &str) -> String {
        format!("{}/api/v1/namespaces/{}/pods/{}", self.api_base, namespace, name)
    }
}

#[async_trait]
impl WorkloadDirectory for KubeApiDirectory {
    async fn lookup(&self, namespace: &str, name: &str) -> Result<Workload, DirectoryError> {
        if !is_dns_label(namespace) || !is_dns_subdomain(name) {
            return Err(DirectoryError::InvalidName {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }

        let url = self.pod_url(namespace, name);
        debug!(%url, "Looking up workload");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| DirectoryError::lookup(namespace, name, e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(DirectoryError::UnexpectedStatus {
                namespace: namespace.to_string(),
                name: name.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DirectoryError::lookup(namespace, name, e.to_string()))?;
        let pod: Pod = serde_json::from_slice(&body).map_err(|source| DirectoryError::Parse {
            namespace: namespace.to_string(),
            name: name.to_string(),
            source,
        })?;

        Ok(Workload::from(pod))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_lookup_reads_pod_by_namespace_and_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/prod/pods/web-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "Pod",
                "metadata": {"name": "web-1", "namespace": "prod", "uid": "u-1"},
                "status": {"podIP": "10.0.0.5", "hostIP": "192.168.1.7"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let directory = KubeApiDirectory::new(server.uri()).unwrap();
        let workload = directory.lookup("prod", "web-1").await.unwrap();

        assert_eq!(workload.kind, "Pod");
        assert_eq!(workload.pod_ip, "10.0.0.5");
        assert_eq!(workload.uid, "u-1");
    }

    #[test]
    fn test_object_name_rules() {
        assert!(is_dns_label("prod"));
        assert!(is_dns_label("team-a1"));
        assert!(!is_dns_label(""));
        assert!(!is_dns_label("-prod"));
        assert!(!is_dns_label("Prod"));
        assert!(!is_dns_label(&"a".repeat(64)));

        assert!(is_dns_subdomain("web-1"));
        assert!(is_dns_subdomain("web-1.canary"));
        for bad in ["..", "web-1/../other", "web-1?watch=1", "web-1#x", "web..1", "web-1.", "web 1"] {
            assert!(!is_dns_subdomain(bad), "{bad:?} accepted");
        }
    }

    #[tokio::test]
    async fn test_lookup_rejects_path_tricks_without_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "metadata": {"name": "other", "namespace": "prod"},
                "status": {"podIP": "10.0.0.9"}
            })))
            .expect(0)
            .mount(&server)
            .await;

        let directory = KubeApiDirectory::new(server.uri()).unwrap();
        for (namespace, name) in
            [("prod", "web-1/../other"), ("prod", ".."), ("prod/pods/other#", "web-1"), ("prod", "web-1?x=1")]
        {
            let err = directory.lookup(namespace, name).await.unwrap_err();
            assert!(matches!(err, DirectoryError::InvalidName { .. }), "{namespace}/{name}: {err}");
        }
    }

    #[tokio::test]
    async fn test_lookup_not_found_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let directory = KubeApiDirectory::new(server.uri()).unwrap();
        let err = directory.lookup("prod", "ghost").await.unwrap_err();
        assert!(matches!(err, DirectoryError::UnexpectedStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_lookup_unparseable_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let directory = KubeApiDirectory::new(server.uri()).unwrap();
        let err = directory.lookup("prod", "web-1").await.unwrap_err();
        assert!(matches!(err, DirectoryError::Parse { .. }));
    }
}
