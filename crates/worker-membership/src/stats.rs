//! Agent counters and their Prometheus text exposition.
//!
//! Counters are plain atomics written by the agent task and read by
//! status surfaces.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Running totals for one agent.
#[derive(Debug, Default)]
pub struct AgentStats {
    registration_attempts: AtomicU64,
    registrations: AtomicU64,
    redirects: AtomicU64,
    heartbeats_ok: AtomicU64,
    heartbeats_rejected: AtomicU64,
    heartbeats_failed: AtomicU64,
    last_heartbeat_epoch: AtomicU64,
}

/// Point-in-time copy of [`AgentStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub registration_attempts: u64,
    pub registrations: u64,
    pub redirects: u64,
    pub heartbeats_ok: u64,
    pub heartbeats_rejected: u64,
    pub heartbeats_failed: u64,
    /// Unix seconds of the last accepted heartbeat, 0 if none.
    pub last_heartbeat_epoch: u64,
}

impl AgentStats {
    pub(crate) fn record_registration_attempt(&self) {
        self.registration_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_registered(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_redirect(&self) {
        self.redirects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_heartbeat_ok(&self) {
        self.heartbeats_ok.fetch_add(1, Ordering::Relaxed);
        self.last_heartbeat_epoch.store(epoch_secs(), Ordering::Relaxed);
    }

    pub(crate) fn record_heartbeat_rejected(&self) {
        self.heartbeats_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_heartbeat_failed(&self) {
        self.heartbeats_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            registration_attempts: self.registration_attempts.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
            redirects: self.redirects.load(Ordering::Relaxed),
            heartbeats_ok: self.heartbeats_ok.load(Ordering::Relaxed),
            heartbeats_rejected: self.heartbeats_rejected.load(Ordering::Relaxed),
            heartbeats_failed: self.heartbeats_failed.load(Ordering::Relaxed),
            last_heartbeat_epoch: self.last_heartbeat_epoch.load(Ordering::Relaxed),
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Render a stats snapshot in Prometheus text format with a `worker`
/// label.
pub fn render_prometheus(worker_id: &str, s: &StatsSnapshot) -> String {
    let metrics: [(&str, &str, &str, u64); 7] = [
        (
            "worker_registration_attempts_total",
            "counter",
            "RegisterWorker calls sent.",
            s.registration_attempts,
        ),
        (
            "worker_registrations_total",
            "counter",
            "Accepted registrations.",
            s.registrations,
        ),
        (
            "worker_leader_redirects_total",
            "counter",
            "Redirects to another leader followed.",
            s.redirects,
        ),
        (
            "worker_heartbeats_ok_total",
            "counter",
            "Accepted heartbeats.",
            s.heartbeats_ok,
        ),
        (
            "worker_heartbeats_rejected_total",
            "counter",
            "Heartbeats refused without a redirect.",
            s.heartbeats_rejected,
        ),
        (
            "worker_heartbeats_failed_total",
            "counter",
            "Heartbeats that failed below the protocol layer.",
            s.heartbeats_failed,
        ),
        (
            "worker_last_heartbeat_epoch_seconds",
            "gauge",
            "Unix time of the last accepted heartbeat.",
            s.last_heartbeat_epoch,
        ),
    ];

    let worker = escape_label_value(worker_id);
    let mut out = String::new();
    for (name, kind, help, value) in metrics {
        let _ = writeln!(out, "# HELP {name} {help}");
        let _ = writeln!(out, "# TYPE {name} {kind}");
        let _ = writeln!(out, "{name}{{worker=\"{worker}\"}} {value}");
    }
    out
}

/// Escape a label value for the text exposition format.
fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}
