//! Instance snapshot written to `context.json`.

use std::env;
use std::fs;
use std::path::Path;
use std::process;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::io::log_sink::LogHandle;

/// Identity of a running instance, as a controller sees it.
///
/// Field names are part of the external interface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceRecord {
    pub pid: u32,
    pub ppid: u32,
    pub cwd: String,
    /// `key=value` pairs in the order the OS reports them.
    pub env: Vec<String>,
    pub args: Vec<String>,
}

impl InstanceRecord {
    /// Snapshot the current process.
    ///
    /// An unreadable working directory is logged and recorded as `""`.
    pub fn capture(log: &LogHandle) -> Self {
        let cwd = match env::current_dir() {
            Ok(dir) => dir.to_string_lossy().into_owned(),
            Err(err) => {
                log.log(format!("read working directory: {err}"));
                String::new()
            }
        };
        Self {
            pid: process::id(),
            ppid: std::os::unix::process::parent_id(),
            cwd,
            env: env::vars_os()
                .map(|(key, value)| format!("{}={}", key.to_string_lossy(), value.to_string_lossy()))
                .collect(),
            args: env::args_os()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
        }
    }
}

/// Serialize `record` to pretty-printed JSON with trailing newline.
pub fn write_context(path: &Path, record: &InstanceRecord) -> Result<()> {
    debug!(path = %path.display(), pid = record.pid, "writing context");
    let mut payload = serde_json::to_string_pretty(record).context("serialize context")?;
    payload.push('\n');
    fs::write(path, payload).with_context(|| format!("write {}", path.display()))
}

pub fn load_context(path: &Path) -> Result<InstanceRecord> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}
