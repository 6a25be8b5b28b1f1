//! Command implementations.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use moxy::core::exit_token::format_exit_token;
use moxy::core::layout::{InstancePaths, default_base_dir};
use moxy::io::channel::send_to_channel;
use moxy::io::context::load_context;
use moxy::io::instance_dir::list_instances;
use tracing::debug;

use crate::Stream;

pub fn default_base() -> Result<PathBuf> {
    let home = dirs::home_dir().context("resolve home directory")?;
    Ok(default_base_dir(&home))
}

/// Print `program pid` for each instance with a context snapshot.
pub fn list(base: &Path) -> Result<()> {
    for id in list_instances(base)? {
        println!("{} {}", id.program, id.pid);
    }
    Ok(())
}

pub fn show(base: &Path, program: &str, pid: u32) -> Result<()> {
    let paths = existing_instance(base, program, pid)?;
    let record = load_context(&paths.context_path)?;
    let json = serde_json::to_string_pretty(&record).context("serialize context")?;
    println!("{json}");
    Ok(())
}

pub fn show_log(base: &Path, program: &str, pid: u32) -> Result<()> {
    let paths = existing_instance(base, program, pid)?;
    let log = fs::read_to_string(&paths.log_path)
        .with_context(|| format!("read {}", paths.log_path.display()))?;
    print!("{log}");
    Ok(())
}

pub fn write_stream(
    base: &Path,
    program: &str,
    pid: u32,
    stream: Stream,
    text: &str,
    newline: bool,
) -> Result<()> {
    let paths = existing_instance(base, program, pid)?;
    let channel = match stream {
        Stream::Stdout => &paths.stdout_channel,
        Stream::Stderr => &paths.stderr_channel,
    };
    let mut payload = text.to_string();
    if newline {
        payload.push('\n');
    }
    debug!(channel = %channel.display(), bytes = payload.len(), "writing stream");
    send_to_channel(channel, payload.as_bytes())
}

pub fn send_exit(base: &Path, program: &str, pid: u32, code: i32, reason: &str) -> Result<()> {
    let paths = existing_instance(base, program, pid)?;
    let token = format_exit_token(code, Some(reason));
    debug!(code, "sending exit token");
    send_to_channel(&paths.exit_channel, token.as_bytes())
}

fn existing_instance(base: &Path, program: &str, pid: u32) -> Result<InstancePaths> {
    let paths = InstancePaths::new(base, program, pid);
    if !paths.dir.is_dir() {
        bail!("no instance {program}/{pid} under {}", base.display());
    }
    Ok(paths)
}
