//! # Configuration Management
//!
//! Typed, validated settings for each process role. Values arrive from the
//! command line and environment (see [`crate::cli`]) and are checked here
//! before any network activity starts.

pub mod settings;

pub use settings::{
    AgentConfig, ControllerConfig, LogFormat, LoggingConfig, PkiRoleConfig, ServiceConfig,
    DEFAULT_TOKEN_FILE, DEFAULT_WRAP_TTL,
};
