//! Agent lifecycle state.
//!
//! `NotStarted → Registering → Heartbeating → Stopped`, with `Stopped`
//! terminal and reachable from every state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

/// Where the agent is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    NotStarted,
    Registering,
    Heartbeating,
    Stopped,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Registering => "registering",
            Self::Heartbeating => "heartbeating",
            Self::Stopped => "stopped",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::NotStarted,
            1 => Self::Registering,
            2 => Self::Heartbeating,
            _ => Self::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Registering => 1,
            Self::Heartbeating => 2,
            Self::Stopped => 3,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, lock-free holder for the lifecycle state.
#[derive(Debug, Clone)]
pub(crate) struct LifecycleCell {
    inner: Arc<AtomicU8>,
}

impl LifecycleCell {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(AtomicU8::new(LifecycleState::NotStarted.as_u8())),
        }
    }

    pub(crate) fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.inner.load(Ordering::Acquire))
    }

    /// Move to `next` unless already stopped. Returns whether the
    /// transition happened.
    pub(crate) fn advance(&self, next: LifecycleState) -> bool {
        let stopped = LifecycleState::Stopped.as_u8();
        self.inner
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur != stopped).then_some(next.as_u8())
            })
            .is_ok()
    }

    /// Move to `Stopped`. Returns the state it left, or `None` if it
    /// was already stopped.
    pub(crate) fn stop(&self) -> Option<LifecycleState> {
        let prev = self
            .inner
            .swap(LifecycleState::Stopped.as_u8(), Ordering::AcqRel);
        let prev = LifecycleState::from_u8(prev);
        (prev != LifecycleState::Stopped).then_some(prev)
    }
}
