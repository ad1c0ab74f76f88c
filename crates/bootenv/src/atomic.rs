//! Crash-safe whole-file replacement

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::EnvError;

/// `path` with `suffix` appended to the file name
pub(crate) fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Replace `path` with `content`
///
/// The data is written to `<path><suffix>`, synced, and renamed over `path`,
/// so readers see either the old or the new file and never a mix.
pub(crate) fn write_atomic(path: &Path, content: &[u8], suffix: &str) -> Result<(), EnvError> {
    let temp_path = sibling_path(path, suffix);
    debug!(path = %path.display(), temp = %temp_path.display(), "Writing file atomically");

    let result = write_synced(&temp_path, content)
        .and_then(|()| std::fs::rename(&temp_path, path).map_err(|e| EnvError::io(path, e)));
    if result.is_err() {
        if let Err(e) = std::fs::remove_file(&temp_path) {
            debug!(temp = %temp_path.display(), error = %e, "Temp file not removed");
        }
        return result;
    }

    sync_parent(path);
    Ok(())
}

fn write_synced(path: &Path, content: &[u8]) -> Result<(), EnvError> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| EnvError::io(path, e))?;
    file.write_all(content).map_err(|e| EnvError::io(path, e))?;
    file.sync_all().map_err(|e| EnvError::io(path, e))
}

/// Persist the directory entry of a rename
fn sync_parent(path: &Path) {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
        debug!(dir = %parent.display(), error = %e, "Directory sync failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_replaces_content() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("grubenv");
        std::fs::write(&path, b"old")?;

        write_atomic(&path, b"new", ".new")?;

        assert_eq!(std::fs::read(&path)?, b"new");
        assert!(!dir.path().join("grubenv.new").exists());
        Ok(())
    }

    #[test]
    fn test_creates_missing_file() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bootenv.json");
        write_atomic(&path, b"{}", ".tmp")?;
        assert_eq!(std::fs::read(&path)?, b"{}");
        Ok(())
    }

    #[test]
    fn test_missing_directory_fails() {
        let result = write_atomic(Path::new("/nonexistent/dir/env"), b"x", ".tmp");
        assert!(matches!(result, Err(EnvError::Io { .. })));
    }

    #[test]
    fn test_sibling_path_appends() {
        assert_eq!(
            sibling_path(Path::new("/boot/grubenv"), ".new"),
            PathBuf::from("/boot/grubenv.new")
        );
    }
}
