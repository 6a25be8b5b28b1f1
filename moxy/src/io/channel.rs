//! Named-pipe channels inside the instance directory.
//!
//! Each channel is a FIFO opened twice without blocking: read end first (never
//! blocks), then write end (succeeds because this process is already a
//! reader). Holding both ends means reads report "would block" instead of EOF
//! when an external writer goes away.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use thiserror::Error;
use tracing::debug;

use crate::io::log_sink::LogHandle;

/// The FIFO itself could not be created.
#[derive(Debug, Error)]
#[error("create channel {}", path.display())]
pub struct ChannelCreateError {
    pub path: PathBuf,
    #[source]
    pub source: Errno,
}

/// A FIFO and whichever of its ends could be opened.
#[derive(Debug)]
pub struct NamedChannel {
    pub name: String,
    pub path: PathBuf,
    pub reader: Option<File>,
    pub writer: Option<File>,
}

#[derive(Debug, Clone, Copy)]
enum End {
    Read,
    Write,
}

impl End {
    fn label(self) -> &'static str {
        match self {
            End::Read => "read",
            End::Write => "write",
        }
    }
}

/// Create the FIFO `dir/name` and open both ends non-blocking.
///
/// Open failures are logged and leave that end `None`; only a failure to
/// create the FIFO is an error.
pub fn create_channel(
    dir: &Path,
    name: &str,
    mode: u32,
    log: &LogHandle,
) -> Result<NamedChannel, ChannelCreateError> {
    let path = dir.join(name);
    mkfifo(&path, Mode::from_bits_truncate(mode as _)).map_err(|source| {
        ChannelCreateError {
            path: path.clone(),
            source,
        }
    })?;
    debug!(path = %path.display(), mode = %format!("{mode:o}"), "fifo created");

    let reader = open_end(&path, End::Read, log);
    let writer = open_end(&path, End::Write, log);
    Ok(NamedChannel {
        name: name.to_string(),
        path,
        reader,
        writer,
    })
}

fn open_end(path: &Path, end: End, log: &LogHandle) -> Option<File> {
    match open_nonblocking(path, end) {
        Ok(file) => Some(file),
        Err(err) => {
            log.log(format!(
                "open {} end of {}: {err}",
                end.label(),
                path.display()
            ));
            None
        }
    }
}

fn open_nonblocking(path: &Path, end: End) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    match end {
        End::Read => options.read(true),
        End::Write => options.write(true),
    };
    options.custom_flags(OFlag::O_NONBLOCK.bits()).open(path)
}

/// Write `payload` into a channel owned by a running instance.
///
/// The open is non-blocking so a channel nobody reads fails immediately
/// instead of hanging; the write itself blocks until the pipe has room.
pub fn send_to_channel(path: &Path, payload: &[u8]) -> Result<()> {
    let mut file = open_nonblocking(path, End::Write).map_err(|err| {
        if err.raw_os_error() == Some(Errno::ENXIO as i32) {
            anyhow!("no reader on {}: instance is not listening", path.display())
        } else {
            anyhow::Error::new(err).context(format!("open channel {}", path.display()))
        }
    })?;
    set_blocking(&file).with_context(|| format!("clear O_NONBLOCK on {}", path.display()))?;
    file.write_all(payload)
        .with_context(|| format!("write channel {}", path.display()))?;
    Ok(())
}

fn set_blocking(file: &File) -> Result<()> {
    let flags = fcntl(file, FcntlArg::F_GETFL).context("fcntl F_GETFL failed")?;
    let flags = OFlag::from_bits_truncate(flags);
    fcntl(file, FcntlArg::F_SETFL(flags - OFlag::O_NONBLOCK)).context("fcntl F_SETFL failed")?;
    Ok(())
}
