//! Lease renewal for bearer credentials.
//!
//! The controller renews its own token; the mTLS service renews the token
//! the agent persisted. Both use [`LeaseRenewer`].

pub mod renewer;

pub use renewer::{
    BearerCredential, LeaseBackend, LeaseError, LeaseRenewer, RenewalHandle, MIN_RENEWAL_DELAY,
    RENEWAL_RETRY_DELAY,
};
