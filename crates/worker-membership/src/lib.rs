//! worker-membership — the worker side of cluster membership.
//!
//! Announces a worker to the control-plane leader, keeps announcing
//! liveness on a fixed cadence, and follows leader redirects without
//! a restart.
//!
//! # Architecture
//!
//! ```text
//! MembershipAgent
//!   ├── start() → spawns one task:
//!   │   ├── register_with_retry()
//!   │   │   └── attempt_register() → Accepted | Redirected | Rejected
//!   │   └── run_heartbeat()
//!   │       └── Heartbeat() every interval, fail-soft
//!   ├── stop() → sets the stop signal (idempotent)
//!   └── handle() → read-only AgentHandle for status surfaces
//!
//! ControlPlane (trait)
//!   └── GrpcControlPlane → worker.WorkerService over tonic
//! ```
//!
//! Both registration and heartbeat share one [`EndpointCell`] holding
//! the address currently believed to be the leader.

pub mod agent;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
mod heartbeat;
pub mod identity;
pub mod lifecycle;
pub mod protocol;
pub mod stats;

#[cfg(test)]
mod testing;

/// Generated protobuf types and gRPC service stubs.
pub mod proto {
    tonic::include_proto!("worker");
}

pub use agent::{AgentHandle, MembershipAgent};
pub use client::{ControlPlane, ControlPlaneReply, GrpcControlPlane};
pub use config::AgentConfig;
pub use endpoint::EndpointCell;
pub use error::{MembershipError, MembershipResult};
pub use identity::WorkerIdentity;
pub use lifecycle::LifecycleState;
pub use protocol::RegisterOutcome;
pub use stats::{AgentStats, StatsSnapshot, render_prometheus};
