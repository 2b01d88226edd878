//! Control-plane client.
//!
//! [`ControlPlane`] is the seam between the agent and the wire. The
//! production implementation, [`GrpcControlPlane`], speaks
//! `worker.WorkerService` over tonic and keeps one cached channel for
//! the endpoint it last talked to.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use crate::endpoint::to_uri;
use crate::error::{MembershipError, MembershipResult};
use crate::identity::WorkerIdentity;
use crate::proto;
use crate::proto::worker_service_client::WorkerServiceClient;

/// Reply shared by `RegisterWorker` and `Heartbeat`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlPlaneReply {
    pub ok: bool,
    /// Leader address when the contacted endpoint is a follower.
    pub leader_addr: String,
    /// Reason for a rejection.
    pub error: String,
}

impl ControlPlaneReply {
    pub fn accepted() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    pub fn redirect(leader_addr: impl Into<String>) -> Self {
        Self {
            ok: false,
            leader_addr: leader_addr.into(),
            error: String::new(),
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            leader_addr: String::new(),
            error: error.into(),
        }
    }
}

impl From<proto::RegisterWorkerResponse> for ControlPlaneReply {
    fn from(resp: proto::RegisterWorkerResponse) -> Self {
        Self {
            ok: resp.ok,
            leader_addr: resp.leader_addr,
            error: resp.error,
        }
    }
}

impl From<proto::HeartbeatResponse> for ControlPlaneReply {
    fn from(resp: proto::HeartbeatResponse) -> Self {
        Self {
            ok: resp.ok,
            leader_addr: resp.leader_addr,
            error: resp.error,
        }
    }
}

/// The two unary calls the agent makes against the control plane.
///
/// Implementations return `Err` only for failures below the protocol
/// layer; redirects and rejections come back as a reply.
#[tonic::async_trait]
pub trait ControlPlane: Send + Sync + 'static {
    async fn register_worker(
        &self,
        endpoint: &str,
        identity: &WorkerIdentity,
        timeout: Duration,
    ) -> MembershipResult<ControlPlaneReply>;

    async fn heartbeat(
        &self,
        endpoint: &str,
        worker_id: &str,
        timeout: Duration,
    ) -> MembershipResult<ControlPlaneReply>;
}

/// tonic-backed [`ControlPlane`].
#[derive(Default)]
pub struct GrpcControlPlane {
    cached: Mutex<Option<(String, WorkerServiceClient<Channel>)>>,
}

impl GrpcControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    async fn client_for(&self, endpoint: &str) -> MembershipResult<WorkerServiceClient<Channel>> {
        let mut cached = self.cached.lock().await;
        if let Some((addr, client)) = cached.as_ref() {
            if addr == endpoint {
                return Ok(client.clone());
            }
        }

        let uri = to_uri(endpoint);
        let ep = Endpoint::from_shared(uri).map_err(|e| MembershipError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        let channel = ep.connect().await.map_err(|e| MembershipError::Transport {
            endpoint: endpoint.to_string(),
            reason: format!("connect: {e}"),
        })?;

        debug!(%endpoint, "connected to control plane");
        let client = WorkerServiceClient::new(channel);
        *cached = Some((endpoint.to_string(), client.clone()));
        Ok(client)
    }

    /// Drop the cached channel so the next call reconnects.
    async fn forget(&self) {
        *self.cached.lock().await = None;
    }

    async fn bounded<T>(
        &self,
        endpoint: &str,
        timeout: Duration,
        call: impl Future<Output = MembershipResult<T>>,
    ) -> MembershipResult<T> {
        let result = within(endpoint, timeout, call).await;

        if result.is_err() {
            self.forget().await;
        }
        result
    }
}

/// Run `call` under `timeout`, reporting expiry as
/// [`MembershipError::Timeout`] against `endpoint`.
pub(crate) async fn within<T>(
    endpoint: &str,
    timeout: Duration,
    call: impl Future<Output = MembershipResult<T>>,
) -> MembershipResult<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(MembershipError::Timeout {
            endpoint: endpoint.to_string(),
            timeout,
        }),
    }
}

fn status_error(endpoint: &str, status: tonic::Status) -> MembershipError {
    MembershipError::Transport {
        endpoint: endpoint.to_string(),
        reason: format!("gRPC {:?}: {}", status.code(), status.message()),
    }
}

#[tonic::async_trait]
impl ControlPlane for GrpcControlPlane {
    async fn register_worker(
        &self,
        endpoint: &str,
        identity: &WorkerIdentity,
        timeout: Duration,
    ) -> MembershipResult<ControlPlaneReply> {
        let call = async {
            let mut client = self.client_for(endpoint).await?;
            let resp = client
                .register_worker(proto::RegisterWorkerRequest {
                    worker_id: identity.worker_id().to_string(),
                    address: identity.advertised_address().to_string(),
                    cloud_tag: identity.cloud_tag().to_string(),
                })
                .await
                .map_err(|status| status_error(endpoint, status))?;
            Ok(resp.into_inner().into())
        };

        self.bounded(endpoint, timeout, call).await
    }

    async fn heartbeat(
        &self,
        endpoint: &str,
        worker_id: &str,
        timeout: Duration,
    ) -> MembershipResult<ControlPlaneReply> {
        let call = async {
            let mut client = self.client_for(endpoint).await?;
            let resp = client
                .heartbeat(proto::HeartbeatRequest {
                    worker_id: worker_id.to_string(),
                })
                .await
                .map_err(|status| status_error(endpoint, status))?;
            Ok(resp.into_inner().into())
        };

        self.bounded(endpoint, timeout, call).await
    }
}
