//! Control-plane error types.
//!
//! Every failure surfaces to the immediate caller as a typed result; the
//! control plane never retries network operations silently.

use fleet_net::NetError;

/// Errors that can occur in control-plane operations.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// The participant was marked unreachable; the operation was refused
    /// without a network call.
    #[error("participant '{0}' is unreachable")]
    RemoteUnavailable(String),

    /// Transport-level failure, carrying the bus diagnostic. Not retried.
    #[error("RPC failure: {0}")]
    Rpc(#[from] NetError),

    /// A lookup by name or interface id found nothing. Recoverable; the
    /// caller decides.
    #[error("{0} not found")]
    NotFound(String),

    /// A discovery constraint was not met before the deadline.
    #[error("discovery timed out: {0}")]
    DiscoveryTimeout(String),

    /// Discovery observed a different participant set than an exact
    /// constraint allowed.
    #[error("discovery mismatch: {0}")]
    DiscoveryMismatch(String),

    /// A bulk lifecycle transition failed for one or more participants.
    /// Every member was attempted; `failed` lists each failure as
    /// `participant: reason`.
    #[error("'{transition}' failed for {} participant(s): [{}]", failed.len(), failed.join("; "))]
    Lifecycle {
        /// The attempted transition (`load`, `initialize`).
        transition: &'static str,
        /// One entry per failed participant.
        failed: Vec<String>,
    },
}
