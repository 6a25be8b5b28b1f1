//! `moxctl`: inspect and steer running `moxy` instances through their
//! instance directories.

mod cli;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "moxctl", version, about = "Controller for moxy instances")]
struct Cli {
    /// Base directory holding instance directories (defaults to `~/moxecutable`).
    #[arg(long, global = true)]
    base: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List running instances as `program pid`.
    List,
    /// Print an instance's `context.json`.
    Show { program: String, pid: u32 },
    /// Print an instance's `log.txt`.
    Log { program: String, pid: u32 },
    /// Send text to an instance's stdout or stderr channel.
    Write {
        program: String,
        pid: u32,
        stream: Stream,
        text: String,
        /// Do not append a trailing newline.
        #[arg(short = 'n', long)]
        no_newline: bool,
    },
    /// Send an exit token; the instance exits with `code`.
    Exit {
        program: String,
        pid: u32,
        #[arg(allow_negative_numbers = true)]
        code: i32,
        /// Free-form text after the code (ignored by the instance, kept in its log).
        reason: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Stream {
    Stdout,
    Stderr,
}

fn main() -> Result<()> {
    moxy::logging::init();

    let cli = Cli::parse();
    let base = match cli.base {
        Some(base) => base,
        None => cli::default_base().context("resolve base directory")?,
    };
    match cli.command {
        Command::List => cli::list(&base),
        Command::Show { program, pid } => cli::show(&base, &program, pid),
        Command::Log { program, pid } => cli::show_log(&base, &program, pid),
        Command::Write {
            program,
            pid,
            stream,
            text,
            no_newline,
        } => cli::write_stream(&base, &program, pid, stream, &text, !no_newline),
        Command::Exit {
            program,
            pid,
            code,
            reason,
        } => cli::send_exit(&base, &program, pid, code, &reason.join(" ")),
    }
}
