//! Product log for an instance (`log.txt`).
//!
//! This is what the controller reads: one line per message, always written,
//! unaffected by `RUST_LOG`. Every message is also emitted as a `debug!`
//! event for the diagnostics in [`crate::logging`].
//!
//! A single thread owns the file and drains a bounded queue, so lines from
//! concurrent producers never interleave and keep per-producer order.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, SendError, SyncSender};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};

#[derive(Debug)]
enum Entry {
    Line(String),
    Close,
}

/// Producer side of the log queue. Cheap to clone; hand one to each component.
#[derive(Debug, Clone)]
pub struct LogHandle {
    tx: SyncSender<Entry>,
}

impl LogHandle {
    /// Enqueue one line. Blocks while the queue is full.
    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        debug!(target: "moxy::log", "{message}");
        if let Err(SendError(Entry::Line(message))) = self.tx.send(Entry::Line(message)) {
            warn!(%message, "log sink stopped, message dropped");
        }
    }
}

/// The consumer thread plus the original handle.
#[derive(Debug)]
pub struct LogSink {
    handle: LogHandle,
    worker: JoinHandle<Result<usize>>,
}

impl LogSink {
    /// Create (truncate) the log file and start draining into it.
    ///
    /// Fails if the file cannot be created; callers treat that as fatal.
    pub fn start(path: &Path, capacity: usize) -> Result<Self> {
        let file =
            File::create(path).with_context(|| format!("create log file {}", path.display()))?;
        let (tx, rx) = mpsc::sync_channel(capacity);
        let worker = thread::Builder::new()
            .name("moxy-log".to_string())
            .spawn(move || drain(rx, BufWriter::new(file)))
            .context("spawn log sink thread")?;
        debug!(path = %path.display(), capacity, "log sink started");
        Ok(Self {
            handle: LogHandle { tx },
            worker,
        })
    }

    pub fn handle(&self) -> LogHandle {
        self.handle.clone()
    }

    /// Close the queue and wait for the sink to write what is left.
    ///
    /// Lines enqueued before the close are written. Handles still alive
    /// afterwards (a relay that never stopped) have their messages dropped.
    /// Returns the number of lines written.
    pub fn close(self) -> Result<usize> {
        let Self { handle, worker } = self;
        if handle.tx.send(Entry::Close).is_err() {
            debug!("log sink already stopped");
        }
        drop(handle);
        match worker.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow!("log sink thread panicked")),
        }
    }
}

fn drain<W: Write>(rx: Receiver<Entry>, mut writer: W) -> Result<usize> {
    let mut written = 0usize;
    for entry in rx {
        let Entry::Line(message) = entry else {
            break;
        };
        let line = if message.contains('\n') {
            message.replace('\n', "\\n")
        } else {
            message
        };
        writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .and_then(|()| writer.flush())
            .context("append log line")?;
        written += 1;
    }
    Ok(written)
}
