//! Side-effecting parts of an instance: files, FIFOs and the threads that pump them.

pub mod channel;
pub mod config;
pub mod context;
pub mod exit_listener;
pub mod instance_dir;
pub mod log_sink;
pub mod readiness;
pub mod relay;
