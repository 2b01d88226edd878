//! Agent timing configuration.

use std::time::Duration;

/// Timings for registration and heartbeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Delay between heartbeats.
    pub heartbeat_interval: Duration,
    /// Delay before retrying a failed or rejected registration.
    pub retry_delay: Duration,
    /// Per-call timeout for `RegisterWorker`.
    pub register_timeout: Duration,
    /// Per-call timeout for `Heartbeat`.
    pub heartbeat_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            retry_delay: Duration::from_secs(5),
            register_timeout: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(3),
        }
    }
}

impl AgentConfig {
    /// Upper bound on how long a running agent takes to exit after
    /// `stop()`: one wait plus one in-flight call.
    pub fn shutdown_bound(&self) -> Duration {
        let wait = self.heartbeat_interval.max(self.retry_delay);
        let call = self.register_timeout.max(self.heartbeat_timeout);
        wait + call
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert_eq!(config.register_timeout, Duration::from_secs(5));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(3));
    }

    #[test]
    fn shutdown_bound_takes_longest_wait_and_call() {
        assert_eq!(AgentConfig::default().shutdown_bound(), Duration::from_secs(10));
    }
}
