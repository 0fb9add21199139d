//! # Credential mint
//!
//! Controller side of the hand-off. `POST /token?name=&namespace=` resolves
//! the workload, mints a child token scoped to the workload's policies,
//! answers `202 Accepted` and pushes only the single-use wrapping envelope
//! to the workload's pod IP on a detached task.

pub mod delivery;
pub mod handler;

pub use delivery::{spawn_delivery, DeliveryError, EnvelopeDelivery, HttpDelivery};
pub use handler::{
    router, token_request_for, MintState, TokenMinter, TokenQuery, VaultMinter, DEFAULT_NAMESPACE,
};
