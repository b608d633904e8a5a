//! Configuration schema for stool.toml

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::locking::LockOptions;
use crate::orchestrator::FailPolicy;
use crate::ports::PortRange;

/// Schema version written by this release.
pub const CONFIG_VERSION: u32 = 1;

/// Root configuration structure for stool.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoolConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub ports: PortsConfig,

    #[serde(default)]
    pub locks: LocksConfig,

    /// Fail policy used when `--fail` is not given
    #[serde(default)]
    pub fail: FailPolicy,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

impl Default for StoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl StoolConfig {
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            ports: PortsConfig::default(),
            locks: LocksConfig::default(),
            fail: FailPolicy::default(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.version != CONFIG_VERSION {
            anyhow::bail!(
                "Unsupported config version {} (expected {})",
                self.version,
                CONFIG_VERSION
            );
        }
        self.ports.range()?;
        if self.locks.poll_interval_ms == 0 {
            anyhow::bail!("locks.poll_interval_ms must be greater than zero");
        }
        Ok(())
    }
}

/// Port pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortsConfig {
    /// First port of the pool; must be even
    #[serde(default = "default_first")]
    pub first: u16,

    /// Last port of the pool, inclusive
    #[serde(default = "default_last")]
    pub last: u16,

    /// Skip fresh ports that cannot be bound on this host
    #[serde(default = "default_true")]
    pub probe: bool,
}

fn default_first() -> u16 {
    9000
}

fn default_last() -> u16 {
    9999
}

fn default_true() -> bool {
    true
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            first: default_first(),
            last: default_last(),
            probe: true,
        }
    }
}

impl PortsConfig {
    pub fn range(&self) -> anyhow::Result<PortRange> {
        Ok(PortRange::new(self.first, self.last)?)
    }
}

/// Lock waiting behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocksConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,

    /// Reclaim holds of dead processes on this host
    #[serde(default = "default_true")]
    pub reclaim_stale: bool,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_progress_interval_secs() -> u64 {
    10
}

impl Default for LocksConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            progress_interval_secs: default_progress_interval_secs(),
            reclaim_stale: true,
        }
    }
}

impl LocksConfig {
    pub fn options(&self) -> LockOptions {
        LockOptions {
            timeout: Duration::from_secs(self.timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            progress_interval: Duration::from_secs(self.progress_interval_secs),
            reclaim_stale: self.reclaim_stale,
        }
    }
}
