//! Instance directory layout.
//!
//! ```text
//! <base>/                  default: <home>/moxecutable
//! ├── moxy.toml            optional config
//! └── <program>/<pid>/
//!     ├── context.json
//!     ├── log.txt
//!     ├── stdin
//!     ├── stdout           FIFO
//!     ├── stderr           FIFO
//!     └── mox_exit         FIFO
//! ```

use std::path::{Path, PathBuf};

pub const BASE_DIR_NAME: &str = "moxecutable";
pub const CONFIG_FILE: &str = "moxy.toml";
pub const CONTEXT_FILE: &str = "context.json";
pub const LOG_FILE: &str = "log.txt";
pub const STDIN_FILE: &str = "stdin";
pub const STDOUT_CHANNEL: &str = "stdout";
pub const STDERR_CHANNEL: &str = "stderr";
pub const EXIT_CHANNEL: &str = "mox_exit";

/// Base directory under a home directory.
pub fn default_base_dir(home: &Path) -> PathBuf {
    home.join(BASE_DIR_NAME)
}

/// Reduce `argv[0]` to the program directory name.
///
/// `./tool`, `tool` and `/usr/bin/tool` all map to `tool`.
pub fn program_name(arg0: &str) -> String {
    Path::new(arg0)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Resolved paths for one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancePaths {
    pub dir: PathBuf,
    pub context_path: PathBuf,
    pub log_path: PathBuf,
    pub stdin_path: PathBuf,
    pub stdout_channel: PathBuf,
    pub stderr_channel: PathBuf,
    pub exit_channel: PathBuf,
}

impl InstancePaths {
    pub fn new(base: &Path, program: &str, pid: u32) -> Self {
        let dir = base.join(program).join(pid.to_string());
        Self {
            dir: dir.clone(),
            context_path: dir.join(CONTEXT_FILE),
            log_path: dir.join(LOG_FILE),
            stdin_path: dir.join(STDIN_FILE),
            stdout_channel: dir.join(STDOUT_CHANNEL),
            stderr_channel: dir.join(STDERR_CHANNEL),
            exit_channel: dir.join(EXIT_CHANNEL),
        }
    }
}
