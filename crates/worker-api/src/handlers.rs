//! HTTP handlers.
//!
//! Every handler reads a snapshot of agent state; none of them block on
//! or write to the agent.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use worker_membership::{StatsSnapshot, render_prometheus};

use crate::ApiState;

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
    pub worker_id: String,
    pub cloud: String,
}

#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub worker_id: String,
    pub cloud_tag: String,
    pub orchestrator_addr: String,
    /// Whether an agent was configured, not whether it is succeeding.
    pub heartbeat_active: bool,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsSnapshot>,
}

/// GET /health
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthBody {
        status: "ok",
        worker_id: state.worker_id,
        cloud: state.cloud_tag,
    })
}

/// GET /status
pub async fn status(State(state): State<ApiState>) -> impl IntoResponse {
    let body = match &state.agent {
        Some(agent) => StatusBody {
            worker_id: state.worker_id.clone(),
            cloud_tag: state.cloud_tag.clone(),
            orchestrator_addr: agent.endpoint(),
            heartbeat_active: true,
            state: agent.state().to_string(),
            stats: Some(agent.stats()),
        },
        None => StatusBody {
            worker_id: state.worker_id.clone(),
            cloud_tag: state.cloud_tag.clone(),
            orchestrator_addr: "not configured".to_string(),
            heartbeat_active: false,
            state: "disabled".to_string(),
            stats: None,
        },
    };
    Json(body)
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state
        .agent
        .as_ref()
        .map(|agent| agent.stats())
        .unwrap_or_default();

    let body = render_prometheus(&state.worker_id, &snapshot);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
