//! Creating and discovering instance directories.

use std::fs::{self, DirBuilder};
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::layout::{CONTEXT_FILE, InstancePaths};

/// A `(program, pid)` pair found under a base directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct InstanceId {
    pub program: String,
    pub pid: u32,
}

/// Create the instance directory with `mode`, replacing a stale one.
///
/// A leftover directory for the same `(program, pid)` can only come from an
/// earlier process that reused this pid; its FIFOs would make channel creation
/// fail, so it is removed first.
pub fn create_instance_dir(paths: &InstancePaths, mode: u32) -> Result<()> {
    if paths.dir.exists() {
        debug!(dir = %paths.dir.display(), "removing stale instance dir");
        fs::remove_dir_all(&paths.dir)
            .with_context(|| format!("remove stale instance dir {}", paths.dir.display()))?;
    }
    DirBuilder::new()
        .recursive(true)
        .mode(mode)
        .create(&paths.dir)
        .with_context(|| format!("create instance dir {}", paths.dir.display()))
}

/// List instances under `base` that have written a context snapshot.
///
/// Sorted by program, then pid. A missing base directory yields no instances.
pub fn list_instances(base: &Path) -> Result<Vec<InstanceId>> {
    let mut found = Vec::new();
    if !base.is_dir() {
        return Ok(found);
    }
    for program in fs::read_dir(base).with_context(|| format!("read {}", base.display()))? {
        let program = program.with_context(|| format!("read entry in {}", base.display()))?;
        if !program.file_type().is_ok_and(|t| t.is_dir()) {
            continue;
        }
        let program_name = program.file_name().to_string_lossy().into_owned();
        let program_dir = program.path();
        for instance in fs::read_dir(&program_dir)
            .with_context(|| format!("read {}", program_dir.display()))?
        {
            let instance =
                instance.with_context(|| format!("read entry in {}", program_dir.display()))?;
            let Some(pid) = instance
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u32>().ok())
            else {
                continue;
            };
            if instance.path().join(CONTEXT_FILE).is_file() {
                found.push(InstanceId {
                    program: program_name.clone(),
                    pid,
                });
            }
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn creates_directory_with_mode() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = InstancePaths::new(temp.path(), "tool", 77);

        create_instance_dir(&paths, 0o700).expect("create");

        let meta = fs::metadata(&paths.dir).expect("metadata");
        assert!(meta.is_dir());
        assert_eq!(meta.permissions().mode() & 0o777, 0o700);
    }

    #[test]
    fn stale_directory_is_replaced() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = InstancePaths::new(temp.path(), "tool", 77);
        fs::create_dir_all(&paths.dir).expect("create stale");
        fs::write(&paths.exit_channel, "stale").expect("write stale");

        create_instance_dir(&paths, 0o755).expect("create");

        assert!(paths.dir.is_dir());
        assert!(!paths.exit_channel.exists());
    }

    #[test]
    fn lists_only_instances_with_context() {
        let temp = tempfile::tempdir().expect("tempdir");
        let base = temp.path();
        for (program, pid) in [("tool", 20), ("tool", 3), ("agent", 9)] {
            let paths = InstancePaths::new(base, program, pid);
            fs::create_dir_all(&paths.dir).expect("dir");
            fs::write(&paths.context_path, "{}").expect("context");
        }
        fs::create_dir_all(base.join("tool").join("not-a-pid")).expect("junk dir");
        fs::create_dir_all(base.join("tool").join("55")).expect("no context");
        fs::write(base.join("moxy.toml"), "").expect("config");

        let found = list_instances(base).expect("list");
        let pairs: Vec<(&str, u32)> = found
            .iter()
            .map(|id| (id.program.as_str(), id.pid))
            .collect();
        assert_eq!(pairs, vec![("agent", 9), ("tool", 3), ("tool", 20)]);
    }

    #[test]
    fn missing_base_lists_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let found = list_instances(&temp.path().join("absent")).expect("list");
        assert!(found.is_empty());
    }
}
