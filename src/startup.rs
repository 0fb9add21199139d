//! Startup sequence for each process role.
//!
//! Every role takes a validated config and the process-wide cancellation
//! token, wires its collaborators explicitly and returns once the token
//! fires (or, for the agent, once the credential is on disk).

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent::{
    self, run_request_loop, AgentTimings, CredentialStore, CredentialWatcher, HttpRequester,
    LoopOutcome, ReceiverState,
};
use crate::api::{bind, serve_http};
use crate::certificates::{CertificateIssuer, CertificateManager};
use crate::config::{AgentConfig, ControllerConfig, ServiceConfig};
use crate::errors::{Error, Result};
use crate::lease::{LeaseBackend, LeaseRenewer};
use crate::mint::{self, HttpDelivery, MintState, VaultMinter};
use crate::observability::MetricsRecorder;
use crate::service;
use crate::vault::VaultClient;
use crate::workload::KubeApiDirectory;

/// Serve `POST /token` while keeping the controller's own token renewed.
pub async fn run_controller(config: ControllerConfig, cancel: CancellationToken) -> Result<()> {
    info!(
        listen_addr = %config.listen_addr,
        vault_addr = %config.vault_addr,
        kube_api = %config.kube_api,
        wrap_ttl = %config.wrap_ttl,
        "Starting credential mint"
    );

    let vault = Arc::new(VaultClient::new(config.vault_addr.as_str())?.with_token(config.vault_token));
    let renewal = LeaseRenewer::new(Arc::clone(&vault) as Arc<dyn LeaseBackend>).spawn();

    let delivery = HttpDelivery::new(config.agent_port).map_err(|e| Error::config(e.to_string()))?;
    let state = MintState {
        directory: Arc::new(KubeApiDirectory::new(config.kube_api.as_str())?),
        minter: Arc::new(VaultMinter::new(vault, config.wrap_ttl)),
        delivery: Arc::new(delivery),
        metrics: MetricsRecorder::new(),
    };

    let served = match bind(config.listen_addr).await {
        Ok(listener) => serve_http(listener, mint::router(state), cancel).await,
        Err(e) => Err(e),
    };

    renewal.stop().await;
    served
}

/// Obtain this workload's credential once, then exit.
pub async fn run_agent(config: AgentConfig, cancel: CancellationToken) -> Result<()> {
    info!(
        pod = %config.pod_name,
        namespace = %config.pod_namespace,
        controller = %config.controller_addr,
        token_file = %config.token_file.display(),
        "Starting workload agent"
    );

    let store = Arc::new(CredentialStore::new(config.token_file.clone()));
    store.prepare().await.map_err(|e| Error::config(e.to_string()))?;
    store.remove_stale().await.map_err(|e| Error::config(e.to_string()))?;

    let file_name = store
        .path()
        .file_name()
        .map(|name| name.to_os_string())
        .ok_or_else(|| Error::config("token file must name a file"))?;
    let mut watcher = CredentialWatcher::watch(store.directory(), file_name)
        .map_err(|e| Error::internal(format!("Failed to watch token directory: {}", e)))?;

    let vault = Arc::new(VaultClient::new(config.vault_addr.as_str())?);
    let receiver = agent::router(ReceiverState {
        store: Arc::clone(&store),
        unwrapper: vault,
        metrics: MetricsRecorder::new(),
    });

    // The receiver must be listening before the controller is asked to push.
    let listener = bind(config.listen_addr).await?;
    let server_cancel = cancel.child_token();
    let server = tokio::spawn(serve_http(listener, receiver, server_cancel.clone()));

    let requester = HttpRequester::new(config.controller_addr.as_str())
        .map_err(|e| Error::config(e.to_string()))?;
    let outcome = run_request_loop(
        &requester,
        &config.pod_name,
        &config.pod_namespace,
        &mut watcher,
        &store,
        AgentTimings::default(),
        &cancel,
    )
    .await;

    server_cancel.cancel();
    match server.await {
        Ok(Err(e)) => warn!(error = %e, "Receiver stopped with an error"),
        Err(e) => warn!(error = %e, "Receiver task ended abnormally"),
        Ok(Ok(())) => {}
    }

    match outcome {
        LoopOutcome::Completed => info!(path = %store.path().display(), "Credential hand-off complete"),
        LoopOutcome::Cancelled => info!("Agent cancelled before the hand-off completed"),
    }
    Ok(())
}

/// Run the mTLS server and/or client roles on the persisted credential.
pub async fn run_service(config: ServiceConfig, cancel: CancellationToken) -> Result<()> {
    info!(
        token_file = %config.token_file.display(),
        vault_addr = %config.vault_addr,
        "Starting mTLS service"
    );

    let (renewer, vault) = LeaseRenewer::from_credential_file(&config.token_file, &config.vault_addr)?;
    let renewal = renewer.spawn();
    let issuer: Arc<dyn CertificateIssuer> = vault;

    let result = start_roles(&config, issuer, &cancel).await;
    let mut tasks = match result {
        Ok(tasks) => tasks,
        Err(e) => {
            cancel.cancel();
            renewal.stop().await;
            return Err(e);
        }
    };

    let mut failure = None;
    tokio::select! {
        _ = cancel.cancelled() => {}
        Some(joined) = tasks.join_next() => {
            if let Ok(Err(e)) = joined {
                error!(error = %e, "Service role failed");
                failure = Some(e);
            }
            cancel.cancel();
        }
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Err(e)) => warn!(error = %e, "Service role stopped with an error"),
            Err(e) => warn!(error = %e, "Service task ended abnormally"),
            Ok(Ok(())) => {}
        }
    }

    renewal.stop().await;
    info!("mTLS service stopped");
    failure.map_or(Ok(()), Err)
}

/// Issue the initial certificates for each enabled role and start its
/// loops. Any issuance failure here aborts startup.
async fn start_roles(
    config: &ServiceConfig,
    issuer: Arc<dyn CertificateIssuer>,
    cancel: &CancellationToken,
) -> Result<JoinSet<Result<()>>> {
    let mut tasks = JoinSet::new();

    if let (Some(issue), Some(service_name)) =
        (config.server_issue_config()?, config.service_name.clone())
    {
        let manager = Arc::new(CertificateManager::new(Arc::clone(&issuer), issue).await?);
        let renewal = manager.spawn_renewal(cancel.clone());
        let addr = config.addr;
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let served = service::run_server(manager, addr, &service_name, cancel).await;
            renewal.abort();
            served
        });
    }

    if let (Some(issue), Some(remote_addr)) =
        (config.client_issue_config()?, config.remote_addr.clone())
    {
        let manager = Arc::new(CertificateManager::new(Arc::clone(&issuer), issue).await?);
        let renewal = manager.spawn_renewal(cancel.clone());
        let cancel = cancel.clone();
        tasks.spawn(async move {
            service::run_client(manager, &remote_addr, service::POLL_INTERVAL, cancel).await;
            renewal.abort();
            Ok(())
        });
    }

    Ok(tasks)
}
