//! Readiness waits and non-blocking reads shared by the relays and the exit listener.
//!
//! Loops block in `poll(2)` for at most one poll interval, then re-check the
//! shutdown signal. "Would block" and zero-byte reads never end a stream.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::fd::AsFd;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

/// Result of one read attempt on a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were read into the buffer.
    Data(usize),
    /// The read returned zero bytes: no writer right now. Not end-of-stream.
    Closed,
    /// Would block or was interrupted.
    NotReady,
}

/// Wait until `source` is readable or `timeout` elapses.
///
/// Returns `true` when a read will not block (data, or a hang-up that reads as
/// zero bytes).
pub fn wait_readable<F: AsFd>(source: &F, timeout: Duration) -> Result<bool> {
    let mut fds = [PollFd::new(source.as_fd(), PollFlags::POLLIN)];
    match poll(&mut fds, poll_timeout(timeout)) {
        Ok(0) | Err(Errno::EINTR) => Ok(false),
        Ok(_) => {
            let revents = fds[0].revents().unwrap_or(PollFlags::empty());
            if revents.contains(PollFlags::POLLNVAL) {
                bail!("poll: descriptor is not open");
            }
            Ok(revents.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR))
        }
        Err(err) => Err(err).context("poll source"),
    }
}

/// Read once from `source` into `buf`.
pub fn read_chunk(mut source: &File, buf: &mut [u8]) -> Result<ReadOutcome> {
    match source.read(buf) {
        Ok(0) => Ok(ReadOutcome::Closed),
        Ok(n) => Ok(ReadOutcome::Data(n)),
        Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
            Ok(ReadOutcome::NotReady)
        }
        Err(err) => Err(err).context("read source"),
    }
}

fn poll_timeout(timeout: Duration) -> PollTimeout {
    let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
    PollTimeout::from(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn regular_file_reads_then_reports_closed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("source");
        fs::write(&path, b"abc").expect("write");
        let file = File::open(&path).expect("open");

        assert!(wait_readable(&file, Duration::ZERO).expect("poll"));
        let mut buf = [0u8; 16];
        assert_eq!(read_chunk(&file, &mut buf).expect("read"), ReadOutcome::Data(3));
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(read_chunk(&file, &mut buf).expect("read"), ReadOutcome::Closed);
    }
}
