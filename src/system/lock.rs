//! Run lock
//!
//! Guards a workspace root against concurrent provisioning runs. The lock
//! file sits next to the workspace root (never inside it), so the clean step
//! cannot delete it.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::LockError;
use crate::system::is_process_alive;

/// Lock metadata stored in the lock file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockMetadata {
    /// Process ID that holds the lock
    pub pid: u32,
    /// Seconds since the epoch when the lock was acquired
    pub acquired_at: u64,
    /// Dependency being provisioned
    pub owner: String,
}

impl LockMetadata {
    fn serialize(&self) -> String {
        format!("{}:{}:{}", self.pid, self.acquired_at, self.owner)
    }

    fn deserialize(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.trim().splitn(3, ':').collect();
        if parts.len() != 3 {
            return None;
        }
        Some(Self {
            pid: parts[0].parse().ok()?,
            acquired_at: parts[1].parse().ok()?,
            owner: parts[2].to_string(),
        })
    }

    fn age(&self) -> Duration {
        Duration::from_secs(now_secs().saturating_sub(self.acquired_at))
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Lock file location for a workspace root: `<parent>/.<dir-name>.provision.lock`
pub fn lock_path_for(workspace_root: &Path) -> PathBuf {
    let name = workspace_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workspace".to_string());
    let parent = workspace_root.parent().unwrap_or(workspace_root);
    parent.join(format!(".{}.provision.lock", name))
}

/// Held run lock; the lock file is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Acquire the lock for `workspace_root`, failing fast if another live
    /// run holds it.
    ///
    /// A lock left behind by a dead process, one older than `stale_after`, or
    /// one whose contents cannot be parsed is reclaimed.
    pub fn acquire(
        workspace_root: &Path,
        owner: &str,
        stale_after: Duration,
    ) -> Result<Self, LockError> {
        let path = lock_path_for(workspace_root);
        let display = path.display().to_string();
        let io_err = |source: io::Error| LockError::Io {
            path: display.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        // second attempt only happens after reclaiming a stale lock
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let metadata = LockMetadata {
                        pid: std::process::id(),
                        acquired_at: now_secs(),
                        owner: owner.to_string(),
                    };
                    file.write_all(metadata.serialize().as_bytes())
                        .map_err(io_err)?;
                    log::debug!("[Lock] Acquired {}", path.display());
                    return Ok(RunLock { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    let existing = fs::read_to_string(&path)
                        .ok()
                        .and_then(|s| LockMetadata::deserialize(&s));

                    match existing {
                        Some(meta) if is_process_alive(meta.pid) && meta.age() < stale_after => {
                            return Err(LockError::HeldByOther {
                                pid: meta.pid,
                                age_secs: meta.age().as_secs(),
                                path: display.clone(),
                            });
                        }
                        Some(meta) => {
                            log::warn!(
                                "[Lock] Reclaiming stale lock {} (pid {}, {}s old)",
                                path.display(),
                                meta.pid,
                                meta.age().as_secs()
                            );
                        }
                        None => {
                            log::warn!("[Lock] Reclaiming unreadable lock {}", path.display());
                        }
                    }

                    match fs::remove_file(&path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => return Err(io_err(e)),
                    }
                }
                Err(e) => return Err(io_err(e)),
            }
        }

        Err(io_err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "lock was re-created by another process while reclaiming it",
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                log::warn!("[Lock] Failed to release {}: {}", self.path.display(), e);
            }
        } else {
            log::debug!("[Lock] Released {}", self.path.display());
        }
    }
}
