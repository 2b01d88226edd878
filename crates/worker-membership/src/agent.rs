//! Membership agent — client-side cluster participation.
//!
//! The agent runs on each worker and, from a single background task,
//! registers with the control-plane leader and then sends periodic
//! heartbeats, following leader redirects along the way.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::client::{ControlPlane, GrpcControlPlane};
use crate::config::AgentConfig;
use crate::endpoint::EndpointCell;
use crate::error::{MembershipError, MembershipResult};
use crate::heartbeat::run_heartbeat;
use crate::identity::WorkerIdentity;
use crate::lifecycle::{LifecycleCell, LifecycleState};
use crate::protocol::{RegisterOutcome, attempt_register};
use crate::stats::{AgentStats, StatsSnapshot};

/// State shared between the agent, its task, and read-only handles.
pub(crate) struct Shared<C> {
    pub(crate) identity: WorkerIdentity,
    pub(crate) endpoint: EndpointCell,
    pub(crate) state: LifecycleCell,
    pub(crate) stats: Arc<AgentStats>,
    pub(crate) config: AgentConfig,
    pub(crate) client: C,
    shutdown: watch::Sender<bool>,
    started: AtomicBool,
}

/// The agent that keeps this worker a member of the cluster.
pub struct MembershipAgent<C: ControlPlane = GrpcControlPlane> {
    shared: Arc<Shared<C>>,
}

impl MembershipAgent<GrpcControlPlane> {
    /// Create an agent that talks gRPC to `control_plane_addr`.
    pub fn new(
        identity: WorkerIdentity,
        control_plane_addr: impl Into<String>,
        config: AgentConfig,
    ) -> Self {
        Self::with_client(identity, control_plane_addr, config, GrpcControlPlane::new())
    }
}

impl<C: ControlPlane> MembershipAgent<C> {
    /// Create an agent over any [`ControlPlane`] implementation.
    pub fn with_client(
        identity: WorkerIdentity,
        control_plane_addr: impl Into<String>,
        config: AgentConfig,
        client: C,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                identity,
                endpoint: EndpointCell::new(control_plane_addr),
                state: LifecycleCell::new(),
                stats: Arc::new(AgentStats::default()),
                config,
                client,
                shutdown,
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Spawn the registration → heartbeat task.
    ///
    /// Must be called from within a tokio runtime. A second call on the
    /// same agent fails with [`MembershipError::AlreadyStarted`]. If
    /// `stop()` was already called the task exits without any RPC.
    pub fn start(&self) -> MembershipResult<JoinHandle<()>> {
        if self.shared.started.swap(true, Ordering::AcqRel) {
            return Err(MembershipError::AlreadyStarted);
        }

        let shutdown = self.shared.shutdown.subscribe();
        let shared = Arc::clone(&self.shared);
        Ok(tokio::spawn(async move {
            run(&*shared, shutdown).await;
        }))
    }

    /// Request termination.
    ///
    /// Idempotent, safe before `start()` and after the task exited.
    /// Does not wait; await the handle from `start()` to join.
    pub fn stop(&self) {
        self.shared.shutdown.send_replace(true);
        if let Some(prev) = self.shared.state.stop() {
            info!(
                worker_id = %self.shared.identity.worker_id(),
                from = %prev,
                "membership agent stopped"
            );
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.state.get()
    }

    /// Snapshot of the endpoint currently believed to be the leader.
    pub fn endpoint(&self) -> String {
        self.shared.endpoint.get()
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.shared.identity
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Read-only view for status surfaces.
    pub fn handle(&self) -> AgentHandle {
        AgentHandle {
            identity: self.shared.identity.clone(),
            endpoint: self.shared.endpoint.clone(),
            state: self.shared.state.clone(),
            stats: Arc::clone(&self.shared.stats),
        }
    }
}

#[cfg(test)]
impl<C: ControlPlane> MembershipAgent<C> {
    pub(crate) fn shared_for_tests(&self) -> &Shared<C> {
        &self.shared
    }

    pub(crate) fn shared_client(&self) -> &C {
        &self.shared.client
    }
}

/// Cheap, cloneable, read-only view of a running agent.
///
/// Handed to the HTTP surface at construction instead of a global.
#[derive(Clone)]
pub struct AgentHandle {
    identity: WorkerIdentity,
    endpoint: EndpointCell,
    state: LifecycleCell,
    stats: Arc<AgentStats>,
}

impl AgentHandle {
    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    /// Possibly one redirect behind the agent task.
    pub fn endpoint(&self) -> String {
        self.endpoint.get()
    }

    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

async fn run<C: ControlPlane>(shared: &Shared<C>, mut shutdown: watch::Receiver<bool>) {
    if *shutdown.borrow() || !shared.state.advance(LifecycleState::Registering) {
        return;
    }

    info!(
        worker_id = %shared.identity.worker_id(),
        endpoint = %shared.endpoint.get(),
        "membership agent starting"
    );

    if !register_with_retry(shared, &mut shutdown).await {
        return;
    }

    if !shared.state.advance(LifecycleState::Heartbeating) {
        return;
    }

    run_heartbeat(shared, &mut shutdown).await;
}

/// Retry registration until accepted or stopped. Returns `false` when
/// stopped first.
async fn register_with_retry<C: ControlPlane>(
    shared: &Shared<C>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let worker_id = shared.identity.worker_id();
    let delay = shared.config.retry_delay;

    loop {
        if *shutdown.borrow() {
            return false;
        }

        let endpoint = shared.endpoint.get();
        shared.stats.record_registration_attempt();

        let outcome = attempt_register(
            &shared.client,
            &shared.identity,
            &endpoint,
            shared.config.register_timeout,
        )
        .await;

        let failure = match outcome {
            Ok(RegisterOutcome::Accepted) => {
                shared.stats.record_registered();
                return true;
            }
            Ok(RegisterOutcome::Redirected(leader)) => {
                info!(%worker_id, %leader, was = %endpoint, "registration redirected to leader");
                shared.endpoint.follow_redirect(&leader);
                shared.stats.record_redirect();
                continue;
            }
            Ok(RegisterOutcome::Rejected(reason)) => MembershipError::Rejected(reason),
            Err(e) => e,
        };

        if failure.is_transport() {
            warn!(
                %worker_id,
                %endpoint,
                error = %failure,
                retry_in = ?delay,
                "control plane unreachable, retrying"
            );
        } else {
            warn!(
                %worker_id,
                %endpoint,
                error = %failure,
                retry_in = ?delay,
                "registration rejected, retrying"
            );
        }

        if !wait_or_stop(shutdown, delay).await {
            return false;
        }
    }
}

/// Sleep for `period` unless the stop signal fires first. Returns
/// `false` when the agent should stop.
pub(crate) async fn wait_or_stop(shutdown: &mut watch::Receiver<bool>, period: Duration) -> bool {
    let stopped = tokio::select! {
        _ = tokio::time::sleep(period) => false,
        _ = shutdown.wait_for(|stop| *stop) => true,
    };
    !stopped && !*shutdown.borrow()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ControlPlaneReply;
    use crate::testing::{CallKind, FakeControlPlane, Scripted, wait_until};

    fn identity() -> WorkerIdentity {
        WorkerIdentity::new("test-worker", "aws", "test-worker:8081")
    }

    fn agent(fake: FakeControlPlane, addr: &str) -> MembershipAgent<FakeControlPlane> {
        MembershipAgent::with_client(identity(), addr, AgentConfig::default(), fake)
    }

    #[test]
    fn agent_creation() {
        let agent = agent(FakeControlPlane::new(), "localhost:50051");
        assert_eq!(agent.state(), LifecycleState::NotStarted);
        assert_eq!(agent.endpoint(), "localhost:50051");
        assert_eq!(agent.identity().advertised_address(), "test-worker:8081");
    }

    #[test]
    fn stop_without_start() {
        let agent = agent(FakeControlPlane::new(), "localhost:50051");
        agent.stop();
        agent.stop();
        assert_eq!(agent.state(), LifecycleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn start_after_stop_exits_without_rpc() {
        let agent = agent(FakeControlPlane::new(), "localhost:50051");
        agent.stop();

        let handle = agent.start().unwrap();
        handle.await.unwrap();

        assert_eq!(agent.state(), LifecycleState::Stopped);
        assert!(agent.shared.client.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected() {
        let agent = agent(FakeControlPlane::new(), "localhost:50051");
        let handle = agent.start().unwrap();

        assert!(matches!(agent.start(), Err(MembershipError::AlreadyStarted)));

        agent.stop();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn redirect_chain_ends_at_last_leader() {
        let fake = FakeControlPlane::new().register_script([
            Scripted::Reply(ControlPlaneReply::redirect("B")),
            Scripted::Reply(ControlPlaneReply::redirect("C")),
            Scripted::Reply(ControlPlaneReply::accepted()),
        ]);
        let agent = agent(fake, "A");
        let handle = agent.start().unwrap();

        wait_until(|| agent.shared.client.count(CallKind::Heartbeat) >= 1).await;

        assert_eq!(agent.endpoint(), "C");
        assert_eq!(agent.state(), LifecycleState::Heartbeating);

        let registers = agent.shared.client.calls_of(CallKind::Register);
        let targets: Vec<&str> = registers.iter().map(|c| c.endpoint.as_str()).collect();
        assert_eq!(targets, ["A", "B", "C"]);
        // Redirects are retried without a delay.
        assert_eq!(registers[0].at, registers[2].at);

        let beats = agent.shared.client.calls_of(CallKind::Heartbeat);
        assert_eq!(beats[0].endpoint, "C");

        let stats = agent.stats();
        assert_eq!(stats.redirects, 2);
        assert_eq!(stats.registrations, 1);

        agent.stop();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_retries_after_delay_without_moving_endpoint() {
        let fake = FakeControlPlane::new().register_script([
            Scripted::Reply(ControlPlaneReply::rejected("raft not ready")),
            Scripted::Reply(ControlPlaneReply::accepted()),
        ]);
        let agent = agent(fake, "localhost:50051");
        let handle = agent.start().unwrap();

        wait_until(|| agent.state() == LifecycleState::Heartbeating).await;

        let registers = agent.shared.client.calls_of(CallKind::Register);
        assert_eq!(registers.len(), 2);
        assert_eq!(registers[1].endpoint, "localhost:50051");
        assert!(registers[1].at - registers[0].at >= Duration::from_secs(5));
        assert_eq!(agent.endpoint(), "localhost:50051");

        agent.stop();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_retries_after_delay() {
        let fake = FakeControlPlane::new().register_script([
            Scripted::Fail,
            Scripted::Fail,
            Scripted::Reply(ControlPlaneReply::accepted()),
        ]);
        let agent = agent(fake, "localhost:50051");
        let handle = agent.start().unwrap();

        wait_until(|| agent.state() == LifecycleState::Heartbeating).await;

        let registers = agent.shared.client.calls_of(CallKind::Register);
        assert_eq!(registers.len(), 3);
        assert!(registers[2].at - registers[0].at >= Duration::from_secs(10));
        assert_eq!(agent.stats().registration_attempts, 3);

        agent.stop();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn redirect_to_same_endpoint_retries_immediately() {
        let fake = FakeControlPlane::new().register_script([
            Scripted::Reply(ControlPlaneReply::redirect("A")),
            Scripted::Reply(ControlPlaneReply::accepted()),
        ]);
        let agent = agent(fake, "A");
        let handle = agent.start().unwrap();

        wait_until(|| agent.state() == LifecycleState::Heartbeating).await;

        let registers = agent.shared.client.calls_of(CallKind::Register);
        assert_eq!(registers.len(), 2);
        assert_eq!(registers[1].endpoint, "A");
        assert_eq!(registers[0].at, registers[1].at);
        assert_eq!(agent.stats().redirects, 1);

        agent.stop();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_hung_registration_ends_within_bound() {
        let fake = FakeControlPlane::new().register_default(Scripted::Hang);
        let agent = agent(fake, "localhost:50051");
        let handle = agent.start().unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        agent.stop();

        let bound = AgentConfig::default().shutdown_bound();
        tokio::time::timeout(bound, handle)
            .await
            .expect("agent task did not stop in time")
            .unwrap();
        assert_eq!(agent.shared.client.count(CallKind::Register), 1);
        assert_eq!(agent.stats().registrations, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_registration_times_out_and_retries() {
        let fake = FakeControlPlane::new().register_script([Scripted::Hang]);
        let agent = agent(fake, "localhost:50051");
        let handle = agent.start().unwrap();

        wait_until(|| agent.state() == LifecycleState::Heartbeating).await;

        let registers = agent.shared.client.calls_of(CallKind::Register);
        assert_eq!(registers.len(), 2);
        // register_timeout (5s) then retry_delay (5s).
        assert!(registers[1].at - registers[0].at >= Duration::from_secs(10));

        agent.stop();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_retry_wait() {
        let fake = FakeControlPlane::new().register_default(Scripted::Fail);
        let agent = agent(fake, "localhost:50051");
        let handle = agent.start().unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let stopped_at = tokio::time::Instant::now();
        agent.stop();
        handle.await.unwrap();

        assert!(stopped_at.elapsed() < Duration::from_secs(5));
        assert_eq!(agent.shared.client.count(CallKind::Register), 1);
        assert_eq!(agent.shared.client.count(CallKind::Heartbeat), 0);
        assert_eq!(agent.state(), LifecycleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_task_within_bound() {
        let agent = agent(FakeControlPlane::new(), "localhost:50051");
        let handle = agent.start().unwrap();

        wait_until(|| agent.shared.client.count(CallKind::Heartbeat) >= 2).await;
        agent.stop();

        let bound = AgentConfig::default().shutdown_bound();
        tokio::time::timeout(bound, handle)
            .await
            .expect("agent task did not stop in time")
            .unwrap();
        assert_eq!(agent.state(), LifecycleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn handle_reflects_agent() {
        let fake = FakeControlPlane::new()
            .register_script([Scripted::Reply(ControlPlaneReply::redirect("cp-aws-1:50051"))]);
        let agent = agent(fake, "localhost:50051");
        let handle = agent.handle();
        assert_eq!(handle.state(), LifecycleState::NotStarted);

        let task = agent.start().unwrap();
        wait_until(|| handle.state() == LifecycleState::Heartbeating).await;

        assert_eq!(handle.endpoint(), "cp-aws-1:50051");
        assert_eq!(handle.identity().worker_id(), "test-worker");
        assert!(handle.stats().heartbeats_ok >= 1);

        agent.stop();
        task.await.unwrap();
        assert_eq!(handle.state(), LifecycleState::Stopped);
    }
}
