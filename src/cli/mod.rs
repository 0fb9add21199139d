//! # Command Line Interface
//!
//! One binary, three roles. Every flag has an environment fallback so the
//! processes can be configured from a pod spec alone.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{
    AgentConfig, ControllerConfig, LogFormat, LoggingConfig, PkiRoleConfig, ServiceConfig,
    DEFAULT_TOKEN_FILE, DEFAULT_WRAP_TTL,
};
use crate::vault::SecretString;
use crate::workload::DEFAULT_KUBE_API;
use crate::Result;

#[derive(Debug, Parser)]
#[command(name = "vault-courier")]
#[command(about = "Hands Vault credentials to cluster workloads and keeps their TLS identities fresh")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, env = "COURIER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, global = true, env = "COURIER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Serve Prometheus metrics on this address
    #[arg(long, global = true, env = "COURIER_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig { level: self.log_level.clone(), format: self.log_format }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Mint wrapped tokens for workloads and push them to their pods
    Controller(ControllerArgs),

    /// Obtain this pod's credential from the controller, then exit
    Agent(AgentArgs),

    /// Serve and call peers over mutual TLS with rotating certificates
    Service(ServiceArgs),
}

impl Commands {
    /// Metrics label for the running role.
    pub fn role(&self) -> &'static str {
        match self {
            Commands::Controller(_) => "controller",
            Commands::Agent(_) => "agent",
            Commands::Service(_) => "service",
        }
    }
}

#[derive(Debug, Args)]
pub struct ControllerArgs {
    /// Address for the token endpoint
    #[arg(long, env = "COURIER_LISTEN_ADDR", default_value = "0.0.0.0:80")]
    pub listen_addr: SocketAddr,

    /// Secret backend address
    #[arg(long, env = "VAULT_ADDR", default_value = "http://vault:8200")]
    pub vault_addr: String,

    /// Token used to mint child tokens
    #[arg(long, env = "VAULT_TOKEN", hide_env_values = true)]
    pub vault_token: String,

    /// Lifetime of the wrapping envelope
    #[arg(long, env = "VAULT_WRAP_TTL", default_value = DEFAULT_WRAP_TTL)]
    pub wrap_ttl: String,

    /// Orchestrator API base URL
    #[arg(long, env = "COURIER_KUBE_API", default_value = DEFAULT_KUBE_API)]
    pub kube_api: String,

    /// Port the agents listen on
    #[arg(long, env = "COURIER_AGENT_PORT", default_value_t = 80)]
    pub agent_port: u16,
}

impl ControllerArgs {
    pub fn into_config(self) -> Result<ControllerConfig> {
        ControllerConfig {
            listen_addr: self.listen_addr,
            vault_addr: self.vault_addr,
            vault_token: SecretString::new(self.vault_token),
            wrap_ttl: self.wrap_ttl,
            kube_api: self.kube_api,
            agent_port: self.agent_port,
        }
        .validate()
    }
}

#[derive(Debug, Args)]
pub struct AgentArgs {
    #[arg(long, env = "POD_NAME")]
    pub pod_name: String,

    #[arg(long, env = "POD_NAMESPACE")]
    pub pod_namespace: String,

    /// Secret backend address
    #[arg(long, env = "VAULT_ADDR", default_value = "http://vault:8200")]
    pub vault_addr: String,

    /// Controller base URL
    #[arg(long, env = "VAULT_CONTROLLER_ADDR", default_value = "http://vault-controller")]
    pub controller_addr: String,

    /// Address the envelope receiver listens on
    #[arg(long, env = "COURIER_LISTEN_ADDR", default_value = "0.0.0.0:80")]
    pub listen_addr: SocketAddr,

    /// Where the unwrapped credential is written
    #[arg(long, env = "COURIER_TOKEN_FILE", default_value = DEFAULT_TOKEN_FILE)]
    pub token_file: PathBuf,
}

impl AgentArgs {
    pub fn into_config(self) -> Result<AgentConfig> {
        AgentConfig {
            pod_name: self.pod_name,
            pod_namespace: self.pod_namespace,
            vault_addr: self.vault_addr,
            controller_addr: self.controller_addr,
            listen_addr: self.listen_addr,
            token_file: self.token_file,
        }
        .validate()
    }
}

#[derive(Debug, Args)]
pub struct ServiceArgs {
    /// HTTPS listen address
    #[arg(long, env = "COURIER_SERVICE_ADDR", default_value = "0.0.0.0:443")]
    pub addr: SocketAddr,

    /// Secret backend address
    #[arg(long, env = "VAULT_ADDR", default_value = "https://vault:8200")]
    pub vault_addr: String,

    /// Credential written by the agent
    #[arg(long, env = "COURIER_TOKEN_FILE", default_value = DEFAULT_TOKEN_FILE)]
    pub token_file: PathBuf,

    /// PKI issue path for the server certificate (e.g. /pki/issue/<role>)
    #[arg(long, default_value = "")]
    pub server_pki_path: String,

    #[arg(long, default_value = "60s")]
    pub server_pki_ttl: String,

    /// PKI issue path for the client certificate (e.g. /pki/issue/<role>)
    #[arg(long, default_value = "")]
    pub client_pki_path: String,

    #[arg(long, default_value = "60s")]
    pub client_pki_ttl: String,

    #[arg(long, default_value = "cluster.local")]
    pub cluster_domain: String,

    /// pod.spec.hostname
    #[arg(long)]
    pub hostname: Option<String>,

    /// pod.status.podIP
    #[arg(long, env = "POD_IP")]
    pub ip: Option<IpAddr>,

    /// pod.metadata.name
    #[arg(long, env = "POD_NAME")]
    pub name: Option<String>,

    /// pod.metadata.namespace
    #[arg(long, env = "POD_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Peer to call over mTLS (e.g. web:443); enables the client role
    #[arg(long)]
    pub remote_addr: Option<String>,

    /// Service name resolving to this pod; enables the server role
    #[arg(long)]
    pub service_name: Option<String>,

    /// pod.spec.subdomain
    #[arg(long)]
    pub subdomain: Option<String>,
}

impl ServiceArgs {
    pub fn into_config(self) -> Result<ServiceConfig> {
        ServiceConfig {
            addr: self.addr,
            vault_addr: self.vault_addr,
            token_file: self.token_file,
            server_pki: PkiRoleConfig { issue_path: self.server_pki_path, ttl: self.server_pki_ttl },
            client_pki: PkiRoleConfig { issue_path: self.client_pki_path, ttl: self.client_pki_ttl },
            cluster_domain: self.cluster_domain,
            hostname: non_empty(self.hostname),
            ip: self.ip,
            name: non_empty(self.name),
            namespace: self.namespace,
            remote_addr: non_empty(self.remote_addr),
            service_name: non_empty(self.service_name),
            subdomain: non_empty(self.subdomain),
        }
        .validate()
    }
}

/// Treat `--flag ""` the same as an absent flag.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
