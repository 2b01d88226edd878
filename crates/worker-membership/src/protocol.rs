//! Registration protocol — one `RegisterWorker` exchange.

use std::time::Duration;

use tracing::info;

use crate::client::{ControlPlane, ControlPlaneReply, within};
use crate::error::MembershipResult;
use crate::identity::WorkerIdentity;

/// How the control plane answered a registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The worker is now a member.
    Accepted,
    /// The endpoint is a follower; retry against this leader.
    Redirected(String),
    /// Refused with no alternate leader; carries the server's reason.
    Rejected(String),
}

impl RegisterOutcome {
    /// Interpret a raw reply. `ok` wins over any leader address.
    pub fn from_reply(reply: ControlPlaneReply) -> Self {
        if reply.ok {
            Self::Accepted
        } else if !reply.leader_addr.is_empty() {
            Self::Redirected(reply.leader_addr)
        } else {
            Self::Rejected(reply.error)
        }
    }
}

/// Send one `RegisterWorker` to `endpoint`.
///
/// Transport failures come back as `Err`; everything the control plane
/// actually said comes back as a [`RegisterOutcome`]. The call is held
/// to `timeout` whether or not the client enforces it.
pub async fn attempt_register<C: ControlPlane + ?Sized>(
    client: &C,
    identity: &WorkerIdentity,
    endpoint: &str,
    timeout: Duration,
) -> MembershipResult<RegisterOutcome> {
    let reply = within(
        endpoint,
        timeout,
        client.register_worker(endpoint, identity, timeout),
    )
    .await?;
    let outcome = RegisterOutcome::from_reply(reply);

    if outcome == RegisterOutcome::Accepted {
        info!(
            worker_id = %identity.worker_id(),
            %endpoint,
            "registered with control plane"
        );
    }

    Ok(outcome)
}
