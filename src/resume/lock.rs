//! Advisory locking of sample logs
//!
//! A log has exactly one writer. The lock lives in a sibling `<log>.lock`
//! file so the log itself stays a plain CSV.

use super::{ResumeError, ResumeResult};
use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive lock on one sample log, released on drop
pub struct LedgerLock {
    // Closing the file releases the flock
    _lock: RwLock<File>,
    path: PathBuf,
}

impl LedgerLock {
    /// Try to acquire the lock for `log_path` without blocking
    ///
    /// # Errors
    /// `LockError` if another handle already holds it
    pub fn try_acquire(log_path: &Path) -> ResumeResult<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ResumeError::IoError(e.to_string()))?;
        }

        let lock_path = lock_path_for(log_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| ResumeError::LockError(format!("Failed to open lock file: {e}")))?;

        let mut lock = RwLock::new(file);
        let guard = lock.try_write().map_err(|e| {
            ResumeError::LockError(format!(
                "{} is locked by another writer: {e}",
                log_path.display()
            ))
        })?;
        // Keep the flock held for the lifetime of the file descriptor
        std::mem::forget(guard);

        Ok(Self {
            _lock: lock,
            path: lock_path,
        })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_path_for(log_path: &Path) -> PathBuf {
    let mut name = log_path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}
