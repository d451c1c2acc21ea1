//! System module: filesystem primitives, workspace path safety, run locking

pub mod lock;
pub mod paths;

use std::fs;
use std::io;
use std::path::Path;

pub use lock::{lock_path_for, RunLock};
pub use paths::validate_workspace_root;

/// Recursively delete `path`.
///
/// Returns `Ok(false)` when there was nothing to delete, so a missing
/// directory counts as already clean.
pub fn remove_dir_all_if_exists(path: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {
            fs::remove_dir_all(path)?;
            Ok(true)
        }
        Ok(_) => {
            // a stray file or symlink where the directory should be
            fs::remove_file(path)?;
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Delete and recreate `path` as an empty directory.
pub fn recreate_dir(path: &Path) -> io::Result<()> {
    remove_dir_all_if_exists(path)?;
    fs::create_dir_all(path)
}

/// Whether a directory exists and has no entries.
pub fn is_empty_dir(path: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(path)?.next().is_none())
}

/// Keep the last `max_lines` lines of `text`.
pub fn tail_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

/// Check whether a process with the given pid is still running.
pub fn is_process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        // exists but belongs to someone else
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}
