//! Pure, deterministic logic shared by the shim and its controllers.

pub mod exit_token;
pub mod layout;
pub mod shutdown;
