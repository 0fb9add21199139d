use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::certificates::PkiIssueConfig;
use crate::service::names;
use crate::vault::SecretString;
use crate::{Error, Result};

/// Default location of the persisted credential file.
pub const DEFAULT_TOKEN_FILE: &str = "/var/run/secrets/vaultproject.io/secret.json";

/// Default TTL requested for the wrapping envelope, in seconds.
pub const DEFAULT_WRAP_TTL: &str = "120";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Fallback filter when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Text }
    }
}

/// Credential mint settings.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub listen_addr: SocketAddr,
    pub vault_addr: String,
    pub vault_token: SecretString,
    pub wrap_ttl: String,
    pub kube_api: String,
    /// Port the workload agents listen on.
    pub agent_port: u16,
}

impl ControllerConfig {
    pub fn validate(self) -> Result<Self> {
        require_url("vault address", &self.vault_addr)?;
        require_url("orchestrator API address", &self.kube_api)?;
        if self.vault_token.is_empty() {
            return Err(Error::config("VAULT_TOKEN must be set and non-empty"));
        }
        if self.wrap_ttl.trim().is_empty() {
            return Err(Error::config("wrap TTL cannot be empty"));
        }
        if self.agent_port == 0 {
            return Err(Error::config("agent port must be non-zero"));
        }
        Ok(self)
    }
}

/// Unwrap agent settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub pod_name: String,
    pub pod_namespace: String,
    pub vault_addr: String,
    pub controller_addr: String,
    pub listen_addr: SocketAddr,
    pub token_file: PathBuf,
}

impl AgentConfig {
    pub fn validate(self) -> Result<Self> {
        if self.pod_name.trim().is_empty() {
            return Err(Error::config("POD_NAME must be set and non-empty"));
        }
        if self.pod_namespace.trim().is_empty() {
            return Err(Error::config("POD_NAMESPACE must be set and non-empty"));
        }
        require_url("vault address", &self.vault_addr)?;
        require_url("controller address", &self.controller_addr)?;
        require_file_name(&self.token_file)?;
        Ok(self)
    }
}

/// Issue path and TTL for one certificate role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkiRoleConfig {
    pub issue_path: String,
    pub ttl: String,
}

/// mTLS service harness settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub addr: SocketAddr,
    pub vault_addr: String,
    pub token_file: PathBuf,
    pub server_pki: PkiRoleConfig,
    pub client_pki: PkiRoleConfig,
    pub cluster_domain: String,
    pub hostname: Option<String>,
    pub ip: Option<IpAddr>,
    pub name: Option<String>,
    pub namespace: String,
    /// URL the client role polls. The client role runs only when set.
    pub remote_addr: Option<String>,
    /// Service name. The server role runs only when set.
    pub service_name: Option<String>,
    pub subdomain: Option<String>,
}

impl ServiceConfig {
    pub fn validate(self) -> Result<Self> {
        require_url("vault address", &self.vault_addr)?;
        require_file_name(&self.token_file)?;

        if self.service_name.is_none() && self.remote_addr.is_none() {
            return Err(Error::config(
                "nothing to run: set --service-name for the server role or --remote-addr for the client role",
            ));
        }
        if self.ip.is_none() {
            return Err(Error::config("--ip (pod IP) is required for certificate names"));
        }
        if self.service_name.is_some() && self.server_pki.issue_path.trim().is_empty() {
            return Err(Error::config("--server-pki-path is required for the server role"));
        }
        if self.remote_addr.is_some() && self.client_pki.issue_path.trim().is_empty() {
            return Err(Error::config("--client-pki-path is required for the client role"));
        }
        Ok(self)
    }

    fn pod_ip(&self) -> Result<IpAddr> {
        self.ip.ok_or_else(|| Error::config("--ip (pod IP) is required for certificate names"))
    }

    /// Issuance settings for the server role, if it is enabled.
    pub fn server_issue_config(&self) -> Result<Option<PkiIssueConfig>> {
        let Some(service_name) = self.service_name.as_deref() else {
            return Ok(None);
        };
        let ip = self.pod_ip()?;

        Ok(Some(PkiIssueConfig {
            issue_path: self.server_pki.issue_path.clone(),
            common_name: names::service_domain_name(service_name, &self.namespace, &self.cluster_domain),
            dns_names: names::server_dns_names(
                service_name,
                ip,
                self.hostname.as_deref(),
                self.subdomain.as_deref(),
                &self.namespace,
                &self.cluster_domain,
            ),
            ip_addresses: vec![ip.to_string(), "127.0.0.1".to_string()],
            ttl: self.server_pki.ttl.clone(),
        }))
    }

    /// Issuance settings for the client role, if it is enabled.
    pub fn client_issue_config(&self) -> Result<Option<PkiIssueConfig>> {
        if self.remote_addr.is_none() {
            return Ok(None);
        }
        let ip = self.pod_ip()?;

        Ok(Some(PkiIssueConfig {
            issue_path: self.client_pki.issue_path.clone(),
            common_name: names::pod_domain_name(ip, &self.namespace, &self.cluster_domain),
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
            ttl: self.client_pki.ttl.clone(),
        }))
    }
}

fn require_url(what: &str, value: &str) -> Result<()> {
    let value = value.trim();
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(Error::config(format!("{} must be an http(s) URL, got '{}'", what, value)));
    }
    Ok(())
}

fn require_file_name(path: &std::path::Path) -> Result<()> {
    if path.file_name().is_none() {
        return Err(Error::config(format!("token file '{}' must name a file", path.display())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_config() -> ServiceConfig {
        ServiceConfig {
            addr: "0.0.0.0:443".parse().unwrap(),
            vault_addr: "https://vault:8200".into(),
            token_file: DEFAULT_TOKEN_FILE.into(),
            server_pki: PkiRoleConfig { issue_path: "/pki/issue/server".into(), ttl: "60s".into() },
            client_pki: PkiRoleConfig { issue_path: "/pki/issue/client".into(), ttl: "60s".into() },
            cluster_domain: "cluster.local".into(),
            hostname: Some("web-0".into()),
            ip: Some("10.0.0.5".parse().unwrap()),
            name: Some("web-0".into()),
            namespace: "prod".into(),
            remote_addr: None,
            service_name: Some("web".into()),
            subdomain: Some("web-headless".into()),
        }
    }

    #[test]
    fn test_server_issue_config_names() {
        let config = service_config().validate().unwrap();
        let issue = config.server_issue_config().unwrap().unwrap();

        assert_eq!(issue.common_name, "web.prod.svc.cluster.local");
        assert_eq!(
            issue.dns_names,
            vec![
                "10.0.0.5.prod.pod.cluster.local".to_string(),
                "web".to_string(),
                "web-0.web-headless.prod.svc.cluster.local".to_string(),
            ]
        );
        assert_eq!(issue.ip_addresses, vec!["10.0.0.5".to_string(), "127.0.0.1".to_string()]);
        assert!(config.client_issue_config().unwrap().is_none());
    }

    #[test]
    fn test_client_issue_config_uses_pod_name() {
        let mut config = service_config();
        config.service_name = None;
        config.remote_addr = Some("https://web.prod.svc:443".into());
        let config = config.validate().unwrap();

        let issue = config.client_issue_config().unwrap().unwrap();
        assert_eq!(issue.common_name, "10.0.0.5.prod.pod.cluster.local");
        assert!(issue.dns_names.is_empty());
        assert!(config.server_issue_config().unwrap().is_none());
    }

    #[test]
    fn test_service_requires_a_role() {
        let mut config = service_config();
        config.service_name = None;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_agent_requires_pod_identity() {
        let config = AgentConfig {
            pod_name: " ".into(),
            pod_namespace: "prod".into(),
            vault_addr: "http://vault:8200".into(),
            controller_addr: "http://vault-controller".into(),
            listen_addr: "0.0.0.0:80".parse().unwrap(),
            token_file: DEFAULT_TOKEN_FILE.into(),
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("POD_NAME"));
    }

    #[test]
    fn test_controller_rejects_empty_token() {
        let config = ControllerConfig {
            listen_addr: "0.0.0.0:80".parse().unwrap(),
            vault_addr: "http://vault:8200".into(),
            vault_token: SecretString::default(),
            wrap_ttl: DEFAULT_WRAP_TTL.into(),
            kube_api: "http://127.0.0.1:8001".into(),
            agent_port: 80,
        };
        assert!(config.validate().is_err());
    }
}
