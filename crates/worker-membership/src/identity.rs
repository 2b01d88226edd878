//! Worker identity announced to the control plane.

/// Immutable identity of this worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    worker_id: String,
    cloud_tag: String,
    advertised_address: String,
}

impl WorkerIdentity {
    /// Build an identity. An empty `advertised_address` falls back to
    /// the worker id.
    pub fn new(
        worker_id: impl Into<String>,
        cloud_tag: impl Into<String>,
        advertised_address: impl Into<String>,
    ) -> Self {
        let worker_id = worker_id.into();
        let mut advertised_address = advertised_address.into();
        if advertised_address.is_empty() {
            advertised_address = worker_id.clone();
        }

        Self {
            worker_id,
            cloud_tag: cloud_tag.into(),
            advertised_address,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn cloud_tag(&self) -> &str {
        &self.cloud_tag
    }

    pub fn advertised_address(&self) -> &str {
        &self.advertised_address
    }
}
