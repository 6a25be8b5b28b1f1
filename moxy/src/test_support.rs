//! Test-only helpers for driving instances the way a controller would.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tempfile::TempDir;

use crate::core::layout::{InstancePaths, default_base_dir};
use crate::io::channel::send_to_channel;

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Temporary home directory; instances started under it use `<home>/moxecutable`.
pub struct TestHome {
    dir: TempDir,
}

impl TestHome {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp home")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn base_dir(&self) -> PathBuf {
        default_base_dir(self.dir.path())
    }

    pub fn instance_paths(&self, program: &str, pid: u32) -> InstancePaths {
        InstancePaths::new(&self.base_dir(), program, pid)
    }
}

/// Poll until `path` exists.
pub fn wait_for_path(path: &Path, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while !path.exists() {
        if Instant::now() >= deadline {
            bail!("timed out waiting for {}", path.display());
        }
        thread::sleep(RETRY_INTERVAL);
    }
    Ok(())
}

/// Send to a channel, retrying while it does not exist yet or has no reader.
pub fn send_when_listening(path: &Path, payload: &[u8], timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        match send_to_channel(path, payload) {
            Ok(()) => return Ok(()),
            Err(err) if Instant::now() >= deadline => {
                return Err(err).with_context(|| format!("send to {}", path.display()));
            }
            Err(_) => thread::sleep(RETRY_INTERVAL),
        }
    }
}

/// Poll `log.txt` until it contains `needle`; returns the log contents.
pub fn wait_for_log_line(path: &Path, needle: &str, timeout: Duration) -> Result<String> {
    let deadline = Instant::now() + timeout;
    loop {
        let contents = std::fs::read_to_string(path).unwrap_or_default();
        if contents.contains(needle) {
            return Ok(contents);
        }
        if Instant::now() >= deadline {
            bail!("{} never logged {needle:?}:\n{contents}", path.display());
        }
        thread::sleep(RETRY_INTERVAL);
    }
}

/// In-memory writer that stays readable after being handed to a relay.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.bytes.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self
            .bytes
            .lock()
            .map_err(|_| io::Error::other("shared buffer poisoned"))?;
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
