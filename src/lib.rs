//! # Vault Courier
//!
//! Delivers secret-backend credentials to cluster workloads without the
//! credential ever crossing the wire in the clear, and keeps the resulting
//! leases and TLS identities fresh.
//!
//! ## Architecture
//!
//! ```text
//! agent ──POST /token──▶ controller ──create wrapped token──▶ Vault
//!   ▲                        │
//!   └──── wrapping envelope ─┘       agent ──unwrap──▶ Vault
//!                                      │
//!                                      ▼
//!                              token file ──▶ service (lease + mTLS certs)
//! ```
//!
//! ## Core Components
//!
//! - **Credential mint** ([`mint`]): resolves the workload, mints a scoped
//!   child token and pushes only its wrapping envelope to the pod
//! - **Workload agent** ([`agent`]): receives the envelope, unwraps it once
//!   and persists the credential exclusively
//! - **Lease renewal** ([`lease`]) and **certificate rotation**
//!   ([`certificates`]) for long-running consumers
//! - **mTLS service harness** ([`service`]): demonstrates rotation under load

pub mod agent;
pub mod api;
pub mod certificates;
pub mod cli;
pub mod config;
pub mod errors;
pub mod lease;
pub mod mint;
pub mod observability;
pub mod service;
pub mod shutdown;
pub mod startup;
pub mod vault;
pub mod workload;

pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
