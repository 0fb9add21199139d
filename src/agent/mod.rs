//! # Workload agent
//!
//! Runs next to a workload and obtains its credential exactly once. The
//! agent listens for the controller's delivery on its pod IP, unwraps the
//! envelope against Vault and writes the result to the token file. A
//! request loop keeps asking the controller until the file exists.

pub mod receiver;
pub mod request_loop;
pub mod store;
pub mod watcher;

pub use receiver::{router, ReceiverState, Unwrapper};
pub use request_loop::{
    run_request_loop, AgentState, AgentTimings, CredentialRequester, HttpRequester, LoopOutcome,
    RequestError, CALLBACK_TIMEOUT, REQUEST_RETRY_DELAY,
};
pub use store::{CredentialStore, StoreError};
pub use watcher::{CompletionEvents, CredentialWatcher, WatchEvent};
