//! # mTLS service harness
//!
//! Demonstration consumer of the hand-off: a workload that authenticates
//! with the persisted credential, obtains server and client certificates
//! from the PKI engine and talks mutual TLS with its peers while the
//! certificates rotate underneath it.

pub mod client;
pub mod names;
pub mod server;

pub use client::{normalize_remote_addr, run_client, POLL_INTERVAL};
pub use server::run_server;
