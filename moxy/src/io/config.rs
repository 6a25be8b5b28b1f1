//! Shim configuration stored at `<base>/moxy.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

const MAX_POLL_INTERVAL_MS: u64 = u16::MAX as u64;

/// Shim configuration (TOML).
///
/// Shared by every instance under the same base directory. Missing fields
/// default to the values the controller protocol was designed around.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MoxyConfig {
    /// Upper bound on how long a relay or the exit listener waits for readiness
    /// before re-checking the shutdown signal. At most 65535 (a `poll(2)`
    /// timeout is kept in a `u16`).
    pub poll_interval_ms: u64,

    /// How long teardown waits for relays to stop after the exit token.
    /// Relays still busy then (for example blocked writing to a stdout nobody
    /// reads) are left behind and the process exits anyway.
    pub shutdown_grace_ms: u64,

    /// Capacity of the log message queue. Producers block when it is full.
    pub log_queue_capacity: usize,

    /// Permission bits for the instance directory.
    pub dir_mode: u32,

    /// Permission bits for the channel FIFOs (subject to umask).
    pub fifo_mode: u32,
}

impl Default for MoxyConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            shutdown_grace_ms: 1000,
            log_queue_capacity: 5,
            dir_mode: 0o755,
            fifo_mode: 0o755,
        }
    }
}

impl MoxyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(anyhow!("poll_interval_ms must be > 0"));
        }
        if self.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(anyhow!(
                "poll_interval_ms must be <= {MAX_POLL_INTERVAL_MS}, got {}",
                self.poll_interval_ms
            ));
        }
        if self.log_queue_capacity == 0 {
            return Err(anyhow!("log_queue_capacity must be > 0"));
        }
        if self.dir_mode > 0o7777 {
            return Err(anyhow!("dir_mode {:o} is not a permission mode", self.dir_mode));
        }
        if self.fifo_mode > 0o7777 {
            return Err(anyhow!(
                "fifo_mode {:o} is not a permission mode",
                self.fifo_mode
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `MoxyConfig::default()`.
pub fn load_config(path: &Path) -> Result<MoxyConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        let cfg = MoxyConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: MoxyConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
