//! EFI variables backend (efivarfs)
//!
//! Each variable is a file `<name>-<vendor-guid>` below the efivarfs mount.
//! Its content is a little-endian `u32` attribute word followed by the raw
//! value. The firmware store replaces a variable in one write, so every
//! operation is atomic per variable; `apply_list` is not atomic as a whole.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::backend::{BootloaderBackend, EnvLimits};
use crate::error::EnvError;
use crate::script::{ScriptOp, load_script};

/// `EFI_VARIABLE_NON_VOLATILE`
pub const EFI_VARIABLE_NON_VOLATILE: u32 = 0x1;
/// `EFI_VARIABLE_BOOTSERVICE_ACCESS`
pub const EFI_VARIABLE_BOOTSERVICE_ACCESS: u32 = 0x2;
/// `EFI_VARIABLE_RUNTIME_ACCESS`
pub const EFI_VARIABLE_RUNTIME_ACCESS: u32 = 0x4;

/// Attributes of every variable written by this backend
pub const DEFAULT_ATTRIBUTES: u32 =
    EFI_VARIABLE_NON_VOLATILE | EFI_VARIABLE_BOOTSERVICE_ACCESS | EFI_VARIABLE_RUNTIME_ACCESS;

const ATTR_LEN: usize = 4;

/// Variables under one vendor GUID in an efivarfs mount
#[derive(Debug, Clone)]
pub struct EfiVars {
    root: PathBuf,
    vendor_guid: String,
    limits: EnvLimits,
}

impl EfiVars {
    /// Backend over `root` for variables of `vendor_guid`
    pub fn new(root: impl Into<PathBuf>, vendor_guid: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            vendor_guid: vendor_guid.into(),
            limits: EnvLimits::default(),
        }
    }

    /// Override the name/value limits
    pub fn with_limits(mut self, limits: EnvLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Whether the efivarfs mount point exists
    pub fn is_available(&self) -> bool {
        self.root.is_dir()
    }

    fn var_path(&self, name: &str) -> Result<PathBuf, EnvError> {
        self.limits.check_name(name)?;
        if name.contains('/') {
            return Err(EnvError::InvalidArgument(format!(
                "EFI variable name {name:?} contains '/'"
            )));
        }
        Ok(self.root.join(format!("{name}-{}", self.vendor_guid)))
    }

    fn write_var(&self, name: &str, value: &str) -> Result<(), EnvError> {
        let path = self.var_path(name)?;
        self.limits.check_value(value)?;

        let mut payload = Vec::with_capacity(ATTR_LEN.saturating_add(value.len()));
        payload.extend_from_slice(&DEFAULT_ATTRIBUTES.to_le_bytes());
        payload.extend_from_slice(value.as_bytes());

        make_mutable(&path);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| EnvError::io(&path, e))?;
        // efivarfs takes the whole variable in a single write(2)
        let written = file.write(&payload).map_err(|e| EnvError::io(&path, e))?;
        if written != payload.len() {
            return Err(EnvError::io(
                &path,
                std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    format!("short write: {written} of {} bytes", payload.len()),
                ),
            ));
        }
        let len = u64::try_from(payload.len()).unwrap_or(u64::MAX);
        if let Err(e) = file.set_len(len) {
            debug!(path = %path.display(), error = %e, "Variable length not adjusted");
        }
        debug!(variable = name, len = value.len(), "Wrote EFI variable");
        Ok(())
    }

    fn remove_var(&self, name: &str) -> Result<(), EnvError> {
        let path = self.var_path(name)?;
        make_mutable(&path);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(variable = name, "Removed EFI variable");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EnvError::io(&path, e)),
        }
    }

    fn check_op(&self, op: &ScriptOp) -> Result<(), EnvError> {
        self.var_path(op.name())?;
        match op {
            ScriptOp::Set { value, .. } => self.limits.check_value(value),
            ScriptOp::Unset { .. } => Ok(()),
        }
    }
}

/// Clear the immutable flag efivarfs puts on every variable; best effort
fn make_mutable(path: &Path) {
    let Ok(file) = File::open(path) else {
        return;
    };
    #[cfg(target_os = "linux")]
    if let Err(e) = crate::sys::clear_immutable(&file) {
        debug!(path = %path.display(), error = %e, "Immutable flag not cleared");
    }
    #[cfg(not(target_os = "linux"))]
    drop(file);
}

impl BootloaderBackend for EfiVars {
    fn env_get(&self, name: &str) -> Result<Option<String>, EnvError> {
        let path = self.var_path(name)?;
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(EnvError::io(&path, e)),
        };

        let value = raw.get(ATTR_LEN..).ok_or_else(|| {
            EnvError::Corrupt(format!("EFI variable {name} is {} bytes", raw.len()))
        })?;
        let value = value.strip_suffix(b"\0").unwrap_or(value);
        let value = std::str::from_utf8(value)
            .map_err(|e| EnvError::Corrupt(format!("EFI variable {name} is not valid UTF-8: {e}")))?;
        Ok(Some(value.to_string()))
    }

    fn env_set(&self, name: &str, value: &str) -> Result<(), EnvError> {
        self.write_var(name, value)
    }

    fn env_unset(&self, name: &str) -> Result<(), EnvError> {
        self.remove_var(name)
    }

    fn apply_list(&self, script: &Path) -> Result<(), EnvError> {
        let ops = load_script(script)?;
        for op in &ops {
            self.check_op(op)?;
        }
        for op in &ops {
            match op {
                ScriptOp::Set { name, value } => self.write_var(name, value)?,
                ScriptOp::Unset { name } => self.remove_var(name)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VENDOR_GUID: &str = "8a4e2c1d-5b3f-4e6a-9d7c-0f1e2d3c4b5a";

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_variable_file_layout() -> TestResult {
        let dir = tempfile::tempdir()?;
        let vars = EfiVars::new(dir.path(), VENDOR_GUID);
        vars.env_set("ustate", "1")?;

        let file = dir.path().join(format!("ustate-{VENDOR_GUID}"));
        assert_eq!(std::fs::read(file)?, [0x07, 0, 0, 0, b'1']);
        assert_eq!(vars.env_get("ustate")?, Some("1".to_string()));
        Ok(())
    }

    #[test]
    fn test_overwrite_with_shorter_value() -> TestResult {
        let dir = tempfile::tempdir()?;
        let vars = EfiVars::new(dir.path(), VENDOR_GUID);
        vars.env_set("bootargs", "console=ttyS0")?;
        vars.env_set("bootargs", "quiet")?;
        assert_eq!(vars.env_get("bootargs")?, Some("quiet".to_string()));
        Ok(())
    }

    #[test]
    fn test_missing_and_unset() -> TestResult {
        let dir = tempfile::tempdir()?;
        let vars = EfiVars::new(dir.path(), VENDOR_GUID);
        assert_eq!(vars.env_get("ustate")?, None);
        vars.env_unset("ustate")?;
        vars.env_set("ustate", "2")?;
        vars.env_unset("ustate")?;
        assert_eq!(vars.env_get("ustate")?, None);
        Ok(())
    }

    #[test]
    fn test_nul_terminated_value() -> TestResult {
        let dir = tempfile::tempdir()?;
        let vars = EfiVars::new(dir.path(), VENDOR_GUID);
        let file = dir.path().join(format!("ustate-{VENDOR_GUID}"));
        std::fs::write(file, [0x07, 0, 0, 0, b'3', 0])?;
        assert_eq!(vars.env_get("ustate")?, Some("3".to_string()));
        Ok(())
    }

    #[test]
    fn test_truncated_variable_is_corrupt() -> TestResult {
        let dir = tempfile::tempdir()?;
        let vars = EfiVars::new(dir.path(), VENDOR_GUID);
        let file = dir.path().join(format!("ustate-{VENDOR_GUID}"));
        std::fs::write(file, [0x07, 0])?;
        assert!(matches!(vars.env_get("ustate"), Err(EnvError::Corrupt(_))));
        Ok(())
    }

    #[test]
    fn test_rejects_path_separator() {
        let vars = EfiVars::new("/nonexistent", VENDOR_GUID);
        assert!(matches!(
            vars.env_set("../escape", "1"),
            Err(EnvError::InvalidArgument(_))
        ));
    }
}
