//! Heartbeat loop.
//!
//! Liveness-only and fail-soft: no reply or failure ends the loop, and
//! nothing here sends the agent back to registration. Only the stop
//! signal ends it.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::agent::{Shared, wait_or_stop};
use crate::client::{ControlPlane, within};

const MISSED_REPORT_EVERY: u64 = 10;

/// What one heartbeat amounted to.
///
/// Every variant keeps the loop running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HeartbeatOutcome {
    Accepted,
    Redirected(String),
    Rejected(String),
    Failed(String),
}

/// Beat immediately, then every `heartbeat_interval`, until stopped.
pub(crate) async fn run_heartbeat<C: ControlPlane>(
    shared: &Shared<C>,
    shutdown: &mut watch::Receiver<bool>,
) {
    let worker_id = shared.identity.worker_id();
    let interval = shared.config.heartbeat_interval;

    info!(
        %worker_id,
        endpoint = %shared.endpoint.get(),
        ?interval,
        "heartbeat loop started"
    );

    // Consecutive beats that did not land.
    let mut missed: u64 = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }

        match send_heartbeat(shared).await {
            HeartbeatOutcome::Accepted => {
                if missed > 0 {
                    info!(%worker_id, missed, "heartbeat recovered");
                }
                missed = 0;
            }
            HeartbeatOutcome::Redirected(leader) => {
                debug!(%worker_id, %leader, "next heartbeat goes to new leader");
            }
            HeartbeatOutcome::Rejected(reason) | HeartbeatOutcome::Failed(reason) => {
                missed += 1;
                if missed % MISSED_REPORT_EVERY == 0 {
                    warn!(%worker_id, missed, last_error = %reason, "heartbeats still not landing");
                }
            }
        }

        if !wait_or_stop(shutdown, interval).await {
            break;
        }
    }

    info!(%worker_id, "heartbeat loop shutting down");
}

/// Send one heartbeat to the current endpoint and absorb the result.
///
/// The call is held to `heartbeat_timeout`, and a panic inside the
/// client is caught here and counted as a failed beat.
pub(crate) async fn send_heartbeat<C: ControlPlane>(shared: &Shared<C>) -> HeartbeatOutcome {
    let worker_id = shared.identity.worker_id();
    let endpoint = shared.endpoint.get();
    let timeout = shared.config.heartbeat_timeout;

    let call = within(
        &endpoint,
        timeout,
        shared.client.heartbeat(&endpoint, worker_id, timeout),
    );

    let reply = match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => {
            shared.stats.record_heartbeat_failed();
            warn!(%worker_id, %endpoint, error = %e, "heartbeat failed");
            return HeartbeatOutcome::Failed(e.to_string());
        }
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            shared.stats.record_heartbeat_failed();
            warn!(%worker_id, %endpoint, error = %reason, "heartbeat faulted");
            return HeartbeatOutcome::Failed(reason);
        }
    };

    if reply.ok {
        shared.stats.record_heartbeat_ok();
        debug!(%worker_id, %endpoint, "heartbeat ok");
        return HeartbeatOutcome::Accepted;
    }

    if !reply.leader_addr.is_empty() {
        info!(
            %worker_id,
            leader = %reply.leader_addr,
            was = %endpoint,
            "heartbeat redirected to leader"
        );
        shared.endpoint.follow_redirect(&reply.leader_addr);
        shared.stats.record_redirect();
        return HeartbeatOutcome::Redirected(reply.leader_addr);
    }

    shared.stats.record_heartbeat_rejected();
    warn!(%worker_id, %endpoint, error = %reply.error, "heartbeat rejected");
    HeartbeatOutcome::Rejected(reply.error)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic in control plane client".to_string()
    }
}
