//! Waits on `mox_exit` for the controller's exit token.

use std::fs::File;
use std::thread;

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::exit_token::ListenerState;
use crate::io::readiness::{ReadOutcome, read_chunk, wait_readable};
use crate::io::relay::LoopContext;

const TOKEN_BUF_BYTES: usize = 64;

/// Block until a valid exit token arrives on `channel`.
///
/// Returns `Ok(Some(code))` for a token and `Ok(None)` when shutdown was
/// requested first. Malformed tokens are logged and the wait continues.
#[instrument(skip_all)]
pub fn listen_for_exit(channel: &File, ctx: &LoopContext) -> Result<Option<i32>> {
    let mut state = ListenerState::Waiting;
    let mut buf = [0u8; TOKEN_BUF_BYTES];
    loop {
        if ctx.shutdown.is_triggered() {
            debug!("shutdown before exit token");
            return Ok(None);
        }
        if !wait_readable(channel, ctx.poll_interval)? {
            continue;
        }
        let payload = match read_chunk(channel, &mut buf)? {
            ReadOutcome::Data(n) => &buf[..n],
            ReadOutcome::Closed => {
                thread::sleep(ctx.poll_interval);
                continue;
            }
            ReadOutcome::NotReady => continue,
        };
        state = match state.on_read(payload) {
            Ok(next) => next.complete(),
            Err(err) => {
                ctx.log.log(format!(
                    "ignoring exit token {:?}: {err}",
                    String::from_utf8_lossy(payload).trim()
                ));
                continue;
            }
        };
        if let Some(code) = state.exit_code() {
            debug!(code, "exit token accepted");
            return Ok(Some(code));
        }
    }
}
