//! Byte pumps between the instance's channels and its real standard streams.
//!
//! One pump per stream, each on its own thread:
//!
//! - `stdout` / `stderr` FIFO read end → real stdout / stderr
//! - real stdin (a duplicated descriptor) → `stdin` capture file
//!
//! A pump never treats an empty read as end-of-stream. It runs until the
//! shared [`Shutdown`] fires, then drains what the source has ready (at most
//! [`DRAIN_BUDGET_BYTES`]) so bytes written before the exit token still arrive.

use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::shutdown::Shutdown;
use crate::io::log_sink::LogHandle;
use crate::io::readiness::{ReadOutcome, read_chunk, wait_readable};

const CHUNK_BYTES: usize = 8192;

/// Most a pump reads after shutdown: one default pipe buffer. A source that
/// never runs dry (`yes | moxy`) must not hold up the exit.
pub const DRAIN_BUDGET_BYTES: usize = 64 * 1024;

/// Settings shared by every relay loop and the exit listener.
#[derive(Debug, Clone)]
pub struct LoopContext {
    pub shutdown: Shutdown,
    pub poll_interval: Duration,
    pub log: LogHandle,
}

/// Copy bytes from `source` to `destination` until shutdown.
///
/// Returns the number of bytes delivered. Destination broken-pipe and
/// would-block errors drop the chunk, get logged, and the pump keeps going.
#[instrument(skip_all, fields(label = %label))]
pub fn pump<W: Write>(
    label: &str,
    source: &File,
    destination: &mut W,
    ctx: &LoopContext,
) -> Result<u64> {
    let mut chunk = vec![0u8; CHUNK_BYTES];
    let mut forwarded = 0u64;
    loop {
        if ctx.shutdown.is_triggered() {
            forwarded += drain_ready(label, source, destination, &mut chunk, ctx)?;
            debug!(forwarded, "pump stopped");
            return Ok(forwarded);
        }
        if !wait_readable(source, ctx.poll_interval)? {
            continue;
        }
        match read_chunk(source, &mut chunk)? {
            ReadOutcome::Data(n) => forwarded += forward(label, &chunk[..n], destination, ctx)?,
            ReadOutcome::Closed => thread::sleep(ctx.poll_interval),
            ReadOutcome::NotReady => {}
        }
    }
}

fn drain_ready<W: Write>(
    label: &str,
    source: &File,
    destination: &mut W,
    chunk: &mut [u8],
    ctx: &LoopContext,
) -> Result<u64> {
    let mut drained = 0u64;
    let mut budget = DRAIN_BUDGET_BYTES;
    while budget > 0 && wait_readable(source, Duration::ZERO)? {
        let len = budget.min(chunk.len());
        match read_chunk(source, &mut chunk[..len])? {
            ReadOutcome::Data(n) => {
                budget -= n;
                drained += forward(label, &chunk[..n], destination, ctx)?;
            }
            ReadOutcome::Closed | ReadOutcome::NotReady => break,
        }
    }
    if budget == 0 && wait_readable(source, Duration::ZERO)? {
        ctx.log.log(format!(
            "{label}: source still readable after draining {DRAIN_BUDGET_BYTES} bytes, stopping"
        ));
    }
    Ok(drained)
}

fn forward<W: Write>(
    label: &str,
    bytes: &[u8],
    destination: &mut W,
    ctx: &LoopContext,
) -> Result<u64> {
    match destination
        .write_all(bytes)
        .and_then(|()| destination.flush())
    {
        Ok(()) => Ok(bytes.len() as u64),
        Err(err) if matches!(err.kind(), ErrorKind::BrokenPipe | ErrorKind::WouldBlock) => {
            ctx.log.log(format!(
                "{label}: dropped {} bytes, destination not writable: {err}",
                bytes.len()
            ));
            thread::sleep(ctx.poll_interval);
            Ok(0)
        }
        Err(err) => Err(err).with_context(|| format!("{label}: write destination")),
    }
}

/// Run [`pump`] on a dedicated thread.
pub fn spawn_relay<W: Write + Send + 'static>(
    label: &'static str,
    source: File,
    mut destination: W,
    ctx: LoopContext,
) -> Result<JoinHandle<Result<u64>>> {
    thread::Builder::new()
        .name(format!("moxy-{label}"))
        .spawn(move || pump(label, &source, &mut destination, &ctx))
        .with_context(|| format!("spawn {label} relay thread"))
}

/// Create the stdin capture file.
///
/// Callers treat failure as fatal: input would otherwise be lost.
pub fn create_capture_file(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("create stdin capture {}", path.display()))
}

/// Duplicate the process's stdin descriptor so it can be polled and read unbuffered.
pub fn duplicate_stdin() -> Result<File> {
    use std::os::fd::AsFd;

    let fd = std::io::stdin()
        .as_fd()
        .try_clone_to_owned()
        .context("duplicate stdin descriptor")?;
    Ok(File::from(fd))
}
