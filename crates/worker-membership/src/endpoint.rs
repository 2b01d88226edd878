//! The control-plane endpoint shared by registration and heartbeats.
//!
//! The agent task is the only writer. Status surfaces on other tasks
//! read snapshots and must tolerate them being one redirect behind.

use std::sync::{Arc, RwLock};

/// Guarded address of the endpoint currently believed to be the leader.
#[derive(Debug, Clone)]
pub struct EndpointCell {
    inner: Arc<RwLock<String>>,
}

impl EndpointCell {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial.into())),
        }
    }

    /// Snapshot of the current endpoint.
    pub fn get(&self) -> String {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Point at the leader named by a redirect. Returns the previous
    /// endpoint.
    pub(crate) fn follow_redirect(&self, leader_addr: &str) -> String {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, leader_addr.to_string())
    }
}

/// Turn a `host:port` endpoint into a URI tonic can dial.
pub fn to_uri(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}
