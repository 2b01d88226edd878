//! workerd.toml configuration parser.
//!
//! Identity and addresses come from flags or the environment; the
//! optional file only tunes membership timings.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use worker_membership::AgentConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerdConfig {
    pub membership: MembershipConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MembershipConfig {
    pub heartbeat_interval_secs: u64,
    pub retry_delay_secs: u64,
    pub register_timeout_secs: u64,
    pub heartbeat_timeout_secs: u64,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 5,
            retry_delay_secs: 5,
            register_timeout_secs: 5,
            heartbeat_timeout_secs: 3,
        }
    }
}

impl WorkerdConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: WorkerdConfig = toml::from_str(content)?;
        config.membership.validate()?;
        Ok(config)
    }
}

impl MembershipConfig {
    fn validate(&self) -> anyhow::Result<()> {
        let fields = [
            ("heartbeat_interval_secs", self.heartbeat_interval_secs),
            ("retry_delay_secs", self.retry_delay_secs),
            ("register_timeout_secs", self.register_timeout_secs),
            ("heartbeat_timeout_secs", self.heartbeat_timeout_secs),
        ];
        for (name, value) in fields {
            if value == 0 {
                anyhow::bail!("membership.{name} must be at least 1");
            }
        }
        Ok(())
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            register_timeout: Duration::from_secs(self.register_timeout_secs),
            heartbeat_timeout: Duration::from_secs(self.heartbeat_timeout_secs),
        }
    }
}
