//! Filesystem-attached process shim.
//!
//! A `moxy` instance exposes its standard streams and exit status through an
//! instance directory under `<home>/moxecutable/<program>/<pid>/`, so an
//! unrelated controller can observe and steer it with nothing but files and
//! named pipes. The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure logic (exit-token state machine, instance layout,
//!   shutdown signal). No I/O.
//! - **[`io`]**: Side effects (FIFOs, relays, the log sink, context snapshot).
//!
//! [`shim`] wires the two together into the instance lifecycle.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod shim;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
