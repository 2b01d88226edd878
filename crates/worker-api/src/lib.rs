//! worker-api — HTTP surface for a pipeline worker.
//!
//! Read-only endpoints over the worker's identity and its membership
//! agent. The agent is injected as an [`AgentHandle`] when the router
//! is built; `None` means no control plane was configured.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/health` | Liveness of the worker process |
//! | GET | `/status` | Identity, control-plane endpoint, agent state |
//! | GET | `/metrics` | Prometheus exposition of agent counters |

pub mod handlers;

use axum::Router;
use axum::routing::get;
use worker_membership::AgentHandle;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct ApiState {
    pub worker_id: String,
    pub cloud_tag: String,
    pub agent: Option<AgentHandle>,
}

impl ApiState {
    /// State for a worker running a membership agent.
    pub fn with_agent(agent: AgentHandle) -> Self {
        let identity = agent.identity();
        Self {
            worker_id: identity.worker_id().to_string(),
            cloud_tag: identity.cloud_tag().to_string(),
            agent: Some(agent),
        }
    }

    /// State for a worker with no control plane configured.
    pub fn standalone(worker_id: impl Into<String>, cloud_tag: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            cloud_tag: cloud_tag.into(),
            agent: None,
        }
    }
}

/// Build the worker's HTTP router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state)
}
