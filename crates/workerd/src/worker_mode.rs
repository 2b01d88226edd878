//! Worker mode — the only mode workerd runs in.
//!
//! In this mode, the daemon:
//! 1. Builds the membership agent if a control plane is configured
//! 2. Starts registration and heartbeats in the background
//! 3. Serves the HTTP health/status surface
//! 4. On shutdown, stops the agent and waits for its task

use std::net::SocketAddr;

use tracing::{info, warn};

use worker_api::{ApiState, build_router};
use worker_membership::{AgentConfig, MembershipAgent, WorkerIdentity};

/// Everything the worker needs, resolved from flags, env, and file.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub worker_id: String,
    pub cloud_tag: String,
    pub orchestrator_addr: String,
    pub worker_addr: String,
    pub http_port: u16,
    pub agent: AgentConfig,
}

/// Build the membership agent, or `None` when no control plane is set.
pub fn build_agent(settings: &WorkerSettings) -> Option<MembershipAgent> {
    if settings.orchestrator_addr.is_empty() {
        return None;
    }

    let identity = WorkerIdentity::new(
        settings.worker_id.clone(),
        settings.cloud_tag.clone(),
        settings.worker_addr.clone(),
    );
    Some(MembershipAgent::new(
        identity,
        settings.orchestrator_addr.clone(),
        settings.agent.clone(),
    ))
}

/// Run the worker until a shutdown signal arrives.
pub async fn run_worker(settings: WorkerSettings) -> anyhow::Result<()> {
    info!(
        worker_id = %settings.worker_id,
        cloud = %settings.cloud_tag,
        "worker ready"
    );

    // ── Membership agent ─────────────────────────────────────────
    let agent = build_agent(&settings);
    let (api_state, agent_task) = match &agent {
        Some(agent) => {
            let task = agent.start()?;
            info!(endpoint = %agent.endpoint(), "heartbeat started");
            (ApiState::with_agent(agent.handle()), Some(task))
        }
        None => {
            warn!("ORCHESTRATOR_ADDR not set, heartbeat disabled");
            (
                ApiState::standalone(settings.worker_id.clone(), settings.cloud_tag.clone()),
                None,
            )
        }
    };

    // ── HTTP surface ─────────────────────────────────────────────
    let router = build_router(api_state);
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.http_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // ── Shutdown ─────────────────────────────────────────────────
    if let Some(agent) = &agent {
        agent.stop();
    }

    if let Some(task) = agent_task {
        let bound = settings.agent.shutdown_bound();
        match tokio::time::timeout(bound, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "membership task ended abnormally"),
            Err(_) => warn!(?bound, "membership task did not stop in time"),
        }
    }

    info!("worker shutdown complete");
    Ok(())
}

/// Resolve on SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
