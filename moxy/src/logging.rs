//! Development-time tracing for the shim and `moxctl`.
//!
//! Diagnostics only; nothing here reaches `log.txt` (see [`crate::io::log_sink`]).
//! Kept quiet by default because stderr is also a relayed stream.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber for development logging.
///
/// Reads `RUST_LOG` env var. Defaults to `warn` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=moxy=debug ./moxy
/// RUST_LOG=debug moxctl list
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
