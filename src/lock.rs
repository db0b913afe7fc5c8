//! Single-instance lock for the supervisor.
//!
//! Two supervisors racing to kill and restart the same bot is exactly what
//! produced the recurring getUpdates "Conflict" errors, so at-most-one is
//! enforced here instead of assumed. The lock file also records the pid of
//! the bot child this supervisor launched, giving later cycles (and the
//! `stop` command) an exact pid instead of a keyword rescan.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::supervisor::locator;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockFile {
    pub supervisor_pid: u32,
    pub child_pid: Option<u32>,
    pub acquired_at: String,
}

#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the exclusive lock, reclaiming it if the recorded supervisor
    /// is no longer alive. A live holder is a fatal error for this process.
    pub fn acquire(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();

        for attempt in 0..2 {
            match Self::try_create(&path) {
                Ok(lock) => {
                    info!(path = %path.display(), "Acquired supervisor lock");
                    return Ok(lock);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt == 0 => {
                    match Self::read(&path)? {
                        Some(existing) if locator::is_alive(existing.supervisor_pid) => {
                            anyhow::bail!(
                                "another supervisor is already running (pid {}, lock {})",
                                existing.supervisor_pid,
                                path.display()
                            );
                        }
                        _ => {
                            warn!(
                                path = %path.display(),
                                "Reclaiming stale supervisor lock"
                            );
                            std::fs::remove_file(&path)?;
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        anyhow::bail!("failed to acquire supervisor lock at {}", path.display())
    }

    fn try_create(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        let contents = LockFile {
            supervisor_pid: std::process::id(),
            child_pid: None,
            acquired_at: chrono::Local::now().to_rfc3339(),
        };
        serde_json::to_writer_pretty(&file, &contents)
            .map_err(|e| std::io::Error::new(ErrorKind::Other, e))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Read the lock file, if present. Unparseable contents count as a
    /// stale lock rather than a live holder.
    pub fn read(path: &Path) -> anyhow::Result<Option<LockFile>> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(serde_json::from_str(&raw).ok()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Record (or clear) the pid of the launched bot child.
    pub fn record_child(&self, child_pid: Option<u32>) -> anyhow::Result<()> {
        let contents = LockFile {
            supervisor_pid: std::process::id(),
            child_pid,
            acquired_at: chrono::Local::now().to_rfc3339(),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&contents)?)?;
        Ok(())
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %self.path.display(), "Failed to remove lock file: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("supervisor.lock");
        let _lock = InstanceLock::acquire(&path).unwrap();
        // same pid is alive (it's us), so the second acquire must refuse
        let err = InstanceLock::acquire(&path).unwrap_err();
        assert!(err.to_string().contains("already running"));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("supervisor.lock");
        {
            let _lock = InstanceLock::acquire(&path).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
        // and can be re-acquired
        let _lock = InstanceLock::acquire(&path).unwrap();
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("supervisor.lock");
        let stale = LockFile {
            supervisor_pid: 999_999_999,
            child_pid: Some(999_999_998),
            acquired_at: "2020-01-01T00:00:00+00:00".to_string(),
        };
        std::fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

        let lock = InstanceLock::acquire(&path).unwrap();
        let current = InstanceLock::read(&path).unwrap().unwrap();
        assert_eq!(current.supervisor_pid, std::process::id());
        drop(lock);
    }

    #[test]
    fn corrupt_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("supervisor.lock");
        std::fs::write(&path, "garbage").unwrap();
        let _lock = InstanceLock::acquire(&path).unwrap();
    }

    #[test]
    fn record_child_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("supervisor.lock");
        let lock = InstanceLock::acquire(&path).unwrap();
        lock.record_child(Some(4242)).unwrap();
        let read = InstanceLock::read(&path).unwrap().unwrap();
        assert_eq!(read.child_pid, Some(4242));
        assert_eq!(read.supervisor_pid, std::process::id());
    }
}
