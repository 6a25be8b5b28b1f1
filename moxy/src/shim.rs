//! Lifecycle of one instance.
//!
//! `Instance::start` provisions the instance directory in dependency order
//! (directory, log sink, context, stdin capture, exit channel, stream
//! channels) and starts one thread per relay. `Instance::wait` runs the exit
//! listener on the calling thread, then stops the relays, joins those that
//! finish within the shutdown grace period, and closes the log before handing
//! back the exit code.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::core::layout::{
    CONFIG_FILE, EXIT_CHANNEL, InstancePaths, STDERR_CHANNEL, STDOUT_CHANNEL, default_base_dir,
    program_name,
};
use crate::core::shutdown::Shutdown;
use crate::io::channel::{NamedChannel, create_channel};
use crate::io::config::{MoxyConfig, load_config};
use crate::io::context::{InstanceRecord, write_context};
use crate::io::exit_listener::listen_for_exit;
use crate::io::instance_dir::create_instance_dir;
use crate::io::log_sink::{LogHandle, LogSink};
use crate::io::relay::{LoopContext, create_capture_file, duplicate_stdin, spawn_relay};

/// Where an instance lives and how it behaves.
#[derive(Debug, Clone)]
pub struct ShimOptions {
    pub base_dir: PathBuf,
    pub program: String,
    pub pid: u32,
    pub config: MoxyConfig,
}

impl ShimOptions {
    /// Resolve options for the current process: `<home>/moxecutable`, the
    /// program name from `argv[0]`, this pid, and `moxy.toml` if present.
    pub fn from_env() -> Result<Self> {
        let home = dirs::home_dir().context("resolve home directory")?;
        let base_dir = default_base_dir(&home);
        let config = load_config(&base_dir.join(CONFIG_FILE))?;
        let arg0 = std::env::args_os()
            .next()
            .map(|arg| arg.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            program: program_name(&arg0),
            pid: std::process::id(),
            base_dir,
            config,
        })
    }

    pub fn paths(&self) -> InstancePaths {
        InstancePaths::new(&self.base_dir, &self.program, self.pid)
    }
}

/// The real streams an instance relays to and captures from.
pub struct Streams {
    /// `None` disables stdin capture (the capture file is still created).
    pub stdin: Option<File>,
    pub stdout: Box<dyn Write + Send>,
    pub stderr: Box<dyn Write + Send>,
}

impl Streams {
    /// The process's own stdio.
    pub fn inherit(log: &LogHandle) -> Self {
        let stdin = match duplicate_stdin() {
            Ok(file) => Some(file),
            Err(err) => {
                log.log(format!("stdin capture disabled: {err:#}"));
                None
            }
        };
        Self {
            stdin,
            stdout: Box::new(io::stdout()),
            stderr: Box::new(io::stderr()),
        }
    }
}

struct Task {
    label: &'static str,
    handle: JoinHandle<Result<u64>>,
}

/// A provisioned, running instance.
pub struct Instance {
    paths: InstancePaths,
    log_sink: LogSink,
    ctx: LoopContext,
    exit_channel: NamedChannel,
    stream_channels: Vec<NamedChannel>,
    tasks: Vec<Task>,
    shutdown_grace: Duration,
}

impl Instance {
    /// Provision the instance directory and start the relays.
    ///
    /// `streams` is built once the log sink exists so stream setup problems
    /// can be reported. Errors here are fatal: the instance is not usable.
    ///
    /// `mox_exit` is created before `stdout` and `stderr`. It is the only
    /// channel whose failure aborts startup, so no relay is ever started for
    /// an instance that could not be stopped.
    pub fn start<F>(options: &ShimOptions, streams: F) -> Result<Self>
    where
        F: FnOnce(&LogHandle) -> Streams,
    {
        options.config.validate()?;
        let paths = options.paths();
        create_instance_dir(&paths, options.config.dir_mode)?;
        let log_sink = LogSink::start(&paths.log_path, options.config.log_queue_capacity)?;
        let ctx = LoopContext {
            shutdown: Shutdown::new(),
            poll_interval: options.config.poll_interval(),
            log: log_sink.handle(),
        };
        let log = &ctx.log;
        log.log(format!(
            "starting instance {}/{}",
            options.program, options.pid
        ));
        info!(dir = %paths.dir.display(), "instance starting");

        log.log("writing context file");
        let record = InstanceRecord::capture(log);
        if let Err(err) = write_context(&paths.context_path, &record) {
            log.log(format!("context not written: {err:#}"));
        }

        let streams = streams(log);
        let capture = match create_capture_file(&paths.stdin_path) {
            Ok(file) => file,
            Err(err) => return Err(abort(log_sink, ctx, err)),
        };

        let exit_channel = match provision_exit_channel(&paths, options, log) {
            Ok(channel) => channel,
            Err(err) => return Err(abort(log_sink, ctx, err)),
        };

        let mut instance = Self {
            paths,
            log_sink,
            ctx,
            exit_channel,
            stream_channels: Vec::new(),
            tasks: Vec::new(),
            shutdown_grace: options.config.shutdown_grace(),
        };
        let Streams {
            stdin,
            stdout,
            stderr,
        } = streams;
        instance.start_stream(STDOUT_CHANNEL, stdout, options.config.fifo_mode);
        instance.start_stream(STDERR_CHANNEL, stderr, options.config.fifo_mode);
        if let Some(stdin) = stdin {
            instance.spawn_task("stdin", stdin, capture);
        }
        Ok(instance)
    }

    pub fn paths(&self) -> &InstancePaths {
        &self.paths
    }

    /// Handle an embedding host can use to stop the instance without a token.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.ctx.shutdown.clone()
    }

    /// Wait for the exit token, then tear everything down.
    ///
    /// Returns `Some(code)` for a token, `None` if shutdown was requested first.
    /// Relays that have not stopped when the shutdown grace period runs out
    /// are logged and left running; the code is returned regardless.
    pub fn wait(self) -> Result<Option<i32>> {
        let Self {
            paths,
            log_sink,
            ctx,
            exit_channel,
            stream_channels,
            tasks,
            shutdown_grace,
        } = self;

        ctx.log.log("waiting for exit");
        let outcome = match exit_channel.reader.as_ref() {
            Some(reader) => listen_for_exit(reader, &ctx),
            None => Err(anyhow!("exit channel has no read end")),
        };
        match &outcome {
            Ok(Some(code)) => ctx
                .log
                .log(format!("received exit token, exiting with code {code}")),
            Ok(None) => ctx.log.log("shutdown requested before an exit token arrived"),
            Err(err) => ctx.log.log(format!("exit listener failed: {err:#}")),
        }

        ctx.shutdown.trigger();
        let deadline = Instant::now() + shutdown_grace;
        for task in tasks {
            if !finished_by(&task.handle, deadline, ctx.poll_interval) {
                ctx.log
                    .log(format!("{} relay still busy at exit", task.label));
                continue;
            }
            match task.handle.join() {
                Ok(Ok(bytes)) => ctx
                    .log
                    .log(format!("{} relay stopped after {bytes} bytes", task.label)),
                Ok(Err(err)) => ctx
                    .log
                    .log(format!("{} relay failed: {err:#}", task.label)),
                Err(_) => ctx.log.log(format!("{} relay panicked", task.label)),
            }
        }
        ctx.log.log("shutdown complete");
        drop(stream_channels);
        drop(exit_channel);
        drop(ctx);

        let lines = log_sink.close().context("close log sink")?;
        debug!(dir = %paths.dir.display(), lines, "instance stopped");
        outcome
    }

    fn start_stream(&mut self, name: &'static str, destination: Box<dyn Write + Send>, mode: u32) {
        let mut channel = match create_channel(&self.paths.dir, name, mode, &self.ctx.log) {
            Ok(channel) => channel,
            Err(err) => {
                self.ctx
                    .log
                    .log(format!("{name} relay disabled: {err}: {}", err.source));
                return;
            }
        };
        match channel.reader.take() {
            Some(reader) => {
                self.ctx.log.log(format!("channel {name} ready"));
                self.spawn_task(name, reader, destination);
            }
            None => self
                .ctx
                .log
                .log(format!("{name} relay disabled: channel has no read end")),
        }
        self.stream_channels.push(channel);
    }

    fn spawn_task<W: Write + Send + 'static>(
        &mut self,
        label: &'static str,
        source: File,
        destination: W,
    ) {
        match spawn_relay(label, source, destination, self.ctx.clone()) {
            Ok(handle) => self.tasks.push(Task { label, handle }),
            Err(err) => self.ctx.log.log(format!("{label} relay not started: {err:#}")),
        }
    }
}

/// Poll `handle` until it finishes or `deadline` passes.
fn finished_by<T>(handle: &JoinHandle<T>, deadline: Instant, interval: Duration) -> bool {
    while !handle.is_finished() {
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep(interval.min(deadline - now));
    }
    true
}

fn provision_exit_channel(
    paths: &InstancePaths,
    options: &ShimOptions,
    log: &LogHandle,
) -> Result<NamedChannel> {
    let channel = create_channel(&paths.dir, EXIT_CHANNEL, options.config.fifo_mode, log)?;
    if channel.reader.is_none() {
        return Err(anyhow!(
            "exit channel {} could not be opened for reading",
            channel.path.display()
        ));
    }
    log.log(format!("channel {EXIT_CHANNEL} ready"));
    Ok(channel)
}

/// Record a fatal startup error in the log, close it, and hand the error back.
fn abort(log_sink: LogSink, ctx: LoopContext, err: anyhow::Error) -> anyhow::Error {
    ctx.log.log(format!("startup failed: {err:#}"));
    drop(ctx);
    if let Err(close_err) = log_sink.close() {
        warn!(err = %close_err, "log sink did not close cleanly");
    }
    err
}

/// Run the current process as an instance until the controller sends an exit token.
pub fn run_current_process() -> Result<Option<i32>> {
    let options = ShimOptions::from_env()?;
    let instance = Instance::start(&options, Streams::inherit)?;
    instance.wait()
}
