use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::store::CredentialStore;
use super::watcher::{CompletionEvents, WatchEvent};

/// Wait after a refused or failed credential request.
pub const REQUEST_RETRY_DELAY: Duration = Duration::from_secs(5);

/// How long to wait for the delivery after a request was accepted.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    WaitingRequest,
    RequestSent,
    CallbackReceived,
    TimedOut,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentTimings {
    pub retry_delay: Duration,
    pub callback_timeout: Duration,
}

impl Default for AgentTimings {
    fn default() -> Self {
        Self { retry_delay: REQUEST_RETRY_DELAY, callback_timeout: CALLBACK_TIMEOUT }
    }
}

/// How the request loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("token request failed: {0}")]
    Transport(String),

    #[error("token request refused with status {status}: {body}")]
    Refused { status: u16, body: String },
}

/// Asks the controller to mint and deliver a credential for this workload.
#[async_trait]
pub trait CredentialRequester: Send + Sync + fmt::Debug {
    async fn request(&self, name: &str, namespace: &str) -> Result<(), RequestError>;
}

/// `POST {controller}/token?name=&namespace=`; only `202` counts as accepted.
#[derive(Debug, Clone)]
pub struct HttpRequester {
    http: reqwest::Client,
    controller_addr: String,
}

impl HttpRequester {
    pub fn new(controller_addr: impl Into<String>) -> Result<Self, RequestError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RequestError::Transport(e.to_string()))?;
        Ok(Self { http, controller_addr: controller_addr.into().trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl CredentialRequester for HttpRequester {
    async fn request(&self, name: &str, namespace: &str) -> Result<(), RequestError> {
        info!(controller = %self.controller_addr, "Requesting a new wrapped token");

        let response = self
            .http
            .post(format!("{}/token", self.controller_addr))
            .query(&[("name", name), ("namespace", namespace)])
            .send()
            .await
            .map_err(|e| RequestError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            return Ok(());
        }

        let body = response.text().await.map_err(|e| RequestError::Transport(e.to_string()))?;
        Err(RequestError::Refused { status: status.as_u16(), body })
    }
}

/// Request a credential until one lands in `store`.
///
/// `WaitingRequest -> RequestSent -> (CallbackReceived | TimedOut)`; a
/// timeout checks the file once before asking again, so a missed event
/// cannot loop forever against an agent that already holds a credential.
pub async fn run_request_loop<E: CompletionEvents>(
    requester: &dyn CredentialRequester,
    name: &str,
    namespace: &str,
    events: &mut E,
    store: &CredentialStore,
    timings: AgentTimings,
    cancel: &CancellationToken,
) -> LoopOutcome {
    let mut state = AgentState::WaitingRequest;
    let mut events_open = true;

    loop {
        debug!(?state, "Agent state");
        state = match state {
            AgentState::WaitingRequest => {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return LoopOutcome::Cancelled,
                    result = requester.request(name, namespace) => result,
                };

                match result {
                    Ok(()) => {
                        info!("Token request complete; waiting for callback");
                        AgentState::RequestSent
                    }
                    Err(e) => {
                        warn!(
                            error = %e,
                            retry_in_secs = timings.retry_delay.as_secs(),
                            "Token request failed"
                        );
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return LoopOutcome::Cancelled,
                            _ = tokio::time::sleep(timings.retry_delay) => {}
                        }
                        AgentState::WaitingRequest
                    }
                }
            }
            AgentState::RequestSent => {
                let timeout = tokio::time::sleep(timings.callback_timeout);
                tokio::pin!(timeout);

                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return LoopOutcome::Cancelled,
                        event = events.next_event(), if events_open => match event {
                            Some(WatchEvent::Written) => break AgentState::CallbackReceived,
                            Some(WatchEvent::Error(e)) => {
                                warn!(error = %e, "Error watching the token file");
                                break AgentState::TimedOut;
                            }
                            None => {
                                warn!("Token file watcher closed");
                                events_open = false;
                            }
                        },
                        _ = &mut timeout => {
                            warn!(
                                timeout_secs = timings.callback_timeout.as_secs(),
                                "Timeout waiting for callback"
                            );
                            break AgentState::TimedOut;
                        }
                    }
                }
            }
            AgentState::TimedOut => {
                if store.exists().await {
                    info!(path = %store.path().display(), "Token file present after timeout");
                    AgentState::CallbackReceived
                } else {
                    AgentState::WaitingRequest
                }
            }
            AgentState::CallbackReceived => {
                info!("Successfully obtained and unwrapped the token");
                AgentState::Done
            }
            AgentState::Done => return LoopOutcome::Completed,
        };
    }
}
