//! Advisory cross-process lock around environment access
//!
//! Only one writer may touch a boot environment at a time. The lock is a
//! plain `flock`-style exclusive lock on a well-known file, the same one the
//! U-Boot userspace tools take, so `fw_setenv` and this crate serialize
//! against each other.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::EnvError;

/// Lock file shared with the U-Boot `fw_printenv`/`fw_setenv` tools
pub const DEFAULT_LOCK_FILE: &str = "/var/lock/fw_printenv.lock";

/// Held exclusive lock; released on drop
#[derive(Debug)]
pub struct EnvLock {
    file: File,
    path: PathBuf,
}

impl EnvLock {
    /// Block until the exclusive lock on `path` is held
    ///
    /// # Errors
    ///
    /// [`EnvError::Io`] if the lock file cannot be created or locked.
    pub fn acquire(path: &Path) -> Result<Self, EnvError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| EnvError::io(path, e))?;
        file.lock().map_err(|e| EnvError::io(path, e))?;
        trace!(path = %path.display(), "Acquired environment lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EnvLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            trace!(path = %self.path.display(), error = %e, "Failed to release environment lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_lock_is_exclusive() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("env.lock");

        let held = EnvLock::acquire(&path)?;
        let other = File::open(&path)?;
        assert!(
            matches!(other.try_lock(), Err(_)),
            "second lock should be refused"
        );

        drop(held);
        other.try_lock()?;
        Ok(())
    }

    #[test]
    fn test_lock_in_missing_directory_fails() {
        let result = EnvLock::acquire(Path::new("/nonexistent/dir/env.lock"));
        assert!(matches!(result, Err(EnvError::Io { .. })));
    }
}
