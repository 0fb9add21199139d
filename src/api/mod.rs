//! HTTP plumbing shared by the controller, agent and service listeners.

pub mod error;
pub mod server;

pub use error::ApiError;
pub use server::{bind, serve_http, serve_tls};
