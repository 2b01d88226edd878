//! Error types for the membership agent.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for membership operations.
pub type MembershipResult<T> = Result<T, MembershipError>;

/// Errors that can occur while talking to the control plane or
/// driving the agent lifecycle.
#[derive(Debug, Error)]
pub enum MembershipError {
    /// The endpoint could not be reached or the call failed below the
    /// protocol layer. Always retryable.
    #[error("transport error talking to {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    /// The call did not complete within its per-call timeout.
    #[error("call to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    /// The endpoint string is not a usable URI.
    #[error("invalid control plane endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// The control plane explicitly refused the request without naming
    /// another leader.
    #[error("rejected by control plane: {0}")]
    Rejected(String),

    #[error("agent already started")]
    AlreadyStarted,
}

impl MembershipError {
    /// Whether the failure happened below the protocol layer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Timeout { .. } | Self::InvalidEndpoint { .. }
        )
    }
}
