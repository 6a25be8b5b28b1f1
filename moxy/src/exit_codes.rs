//! Exit codes the shim uses on its own behalf.
//!
//! In normal operation the process exits with whatever code the controller
//! writes to `mox_exit`; these only apply when that never happens.

/// The instance could not be provisioned (directory, log, stdin capture or exit channel).
pub const STARTUP_FAILURE: i32 = 1;
/// The instance was shut down before any exit token arrived.
pub const NO_EXIT_TOKEN: i32 = 2;
