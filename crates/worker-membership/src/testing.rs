//! Scripted in-memory control plane for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::client::{ControlPlane, ControlPlaneReply};
use crate::error::{MembershipError, MembershipResult};
use crate::identity::WorkerIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallKind {
    Register,
    Heartbeat,
}

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub(crate) kind: CallKind,
    pub(crate) endpoint: String,
    pub(crate) at: Instant,
}

/// What the fake does for one call.
#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    Reply(ControlPlaneReply),
    Fail,
    Panic,
    /// Never answers, whatever timeout it was given.
    Hang,
}

pub(crate) struct FakeControlPlane {
    register: Mutex<VecDeque<Scripted>>,
    heartbeat: Mutex<VecDeque<Scripted>>,
    register_default: Scripted,
    heartbeat_default: Scripted,
    calls: Mutex<Vec<Call>>,
}

impl FakeControlPlane {
    /// Accepts everything unless scripted otherwise.
    pub(crate) fn new() -> Self {
        Self {
            register: Mutex::new(VecDeque::new()),
            heartbeat: Mutex::new(VecDeque::new()),
            register_default: Scripted::Reply(ControlPlaneReply::accepted()),
            heartbeat_default: Scripted::Reply(ControlPlaneReply::accepted()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn register_script(self, steps: impl IntoIterator<Item = Scripted>) -> Self {
        self.register.lock().unwrap().extend(steps);
        self
    }

    pub(crate) fn heartbeat_script(self, steps: impl IntoIterator<Item = Scripted>) -> Self {
        self.heartbeat.lock().unwrap().extend(steps);
        self
    }

    pub(crate) fn register_default(mut self, step: Scripted) -> Self {
        self.register_default = step;
        self
    }

    pub(crate) fn heartbeat_default(mut self, step: Scripted) -> Self {
        self.heartbeat_default = step;
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_of(&self, kind: CallKind) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.kind == kind).collect()
    }

    pub(crate) fn count(&self, kind: CallKind) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.kind == kind).count()
    }

    async fn next(&self, kind: CallKind, endpoint: &str) -> MembershipResult<ControlPlaneReply> {
        self.calls.lock().unwrap().push(Call {
            kind,
            endpoint: endpoint.to_string(),
            at: Instant::now(),
        });

        let step = match kind {
            CallKind::Register => self.register.lock().unwrap().pop_front(),
            CallKind::Heartbeat => self.heartbeat.lock().unwrap().pop_front(),
        };
        let step = step.unwrap_or_else(|| match kind {
            CallKind::Register => self.register_default.clone(),
            CallKind::Heartbeat => self.heartbeat_default.clone(),
        });

        match step {
            Scripted::Reply(reply) => Ok(reply),
            Scripted::Fail => Err(MembershipError::Transport {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            }),
            Scripted::Panic => panic!("injected fault"),
            Scripted::Hang => std::future::pending().await,
        }
    }
}

#[tonic::async_trait]
impl ControlPlane for FakeControlPlane {
    async fn register_worker(
        &self,
        endpoint: &str,
        _identity: &WorkerIdentity,
        _timeout: Duration,
    ) -> MembershipResult<ControlPlaneReply> {
        self.next(CallKind::Register, endpoint).await
    }

    async fn heartbeat(
        &self,
        endpoint: &str,
        _worker_id: &str,
        _timeout: Duration,
    ) -> MembershipResult<ControlPlaneReply> {
        self.next(CallKind::Heartbeat, endpoint).await
    }
}

/// Poll `cond` on virtual time until it holds.
pub(crate) async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..100_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("condition not reached");
}
