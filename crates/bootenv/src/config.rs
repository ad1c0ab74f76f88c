//! Runtime configuration for the boot-environment layer
//!
//! Every field has a default matching a stock Linux board, so an empty file
//! (or no file at all) is a valid configuration:
//!
//! ```yaml
//! bootloader: uboot
//! state_key: ustate
//! uboot:
//!   fw_env_config: /etc/fw_env.config
//!   lock_file: /var/lock/fw_printenv.lock
//! limits:
//!   max_value_len: 4096
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::EnvLimits;
use crate::error::EnvError;
use crate::lock::DEFAULT_LOCK_FILE;

/// Variable holding the update state unless configured otherwise
pub const DEFAULT_STATE_KEY: &str = "ustate";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootenvConfig {
    /// Backend to select at startup; `None` leaves the registry unselected
    pub bootloader: Option<String>,
    /// Variable holding the update state
    pub state_key: String,
    /// Name/value limits applied by every persistent backend
    pub limits: EnvLimits,
    /// U-Boot backend settings
    pub uboot: UBootConfig,
    /// GRUB backend settings
    pub grub: GrubConfig,
    /// EFI variables backend settings
    pub efivars: EfiVarsConfig,
    /// JSON file backend settings
    pub file: FileConfig,
}

impl Default for BootenvConfig {
    fn default() -> Self {
        Self {
            bootloader: None,
            state_key: DEFAULT_STATE_KEY.to_string(),
            limits: EnvLimits::default(),
            uboot: UBootConfig::default(),
            grub: GrubConfig::default(),
            efivars: EfiVarsConfig::default(),
            file: FileConfig::default(),
        }
    }
}

/// U-Boot backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UBootConfig {
    /// `fw_env.config` describing the environment copies
    pub fw_env_config: PathBuf,
    /// Built-in environment used when no stored copy is valid
    pub default_env: Option<PathBuf>,
    /// Advisory lock shared with `fw_setenv`; `None` disables locking
    pub lock_file: Option<PathBuf>,
}

impl Default for UBootConfig {
    fn default() -> Self {
        Self {
            fw_env_config: PathBuf::from("/etc/fw_env.config"),
            default_env: Some(PathBuf::from("/etc/u-boot-initial-env")),
            lock_file: Some(PathBuf::from(DEFAULT_LOCK_FILE)),
        }
    }
}

/// GRUB backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GrubConfig {
    /// Path of the `grubenv` block
    pub envblk: PathBuf,
}

impl Default for GrubConfig {
    fn default() -> Self {
        Self {
            envblk: PathBuf::from("/boot/efi/EFI/BOOT/grub/grubenv"),
        }
    }
}

/// EFI variables backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EfiVarsConfig {
    /// Mount point of efivarfs
    pub root: PathBuf,
    /// Vendor GUID appended to every variable name
    ///
    /// The GUID names the owner of the variables and is chosen by the
    /// product integrator; there is no default. Without it the `efivars`
    /// backend is registered unloaded.
    pub vendor_guid: Option<String>,
}

impl Default for EfiVarsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/sys/firmware/efi/efivars"),
            vendor_guid: None,
        }
    }
}

/// JSON file backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// JSON document holding the variables
    pub path: PathBuf,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/bootstate/bootenv.json"),
        }
    }
}

impl BootenvConfig {
    /// Parse a YAML document
    ///
    /// # Errors
    ///
    /// [`EnvError::Config`] on syntax errors or unknown fields.
    pub fn from_yaml_str(text: &str) -> Result<Self, EnvError> {
        serde_yaml::from_str(text).map_err(|e| EnvError::Config(format!("invalid YAML: {e}")))
    }

    /// Parse a JSON document
    ///
    /// # Errors
    ///
    /// [`EnvError::Config`] on syntax errors or unknown fields.
    pub fn from_json_str(text: &str) -> Result<Self, EnvError> {
        serde_json::from_str(text).map_err(|e| EnvError::Config(format!("invalid JSON: {e}")))
    }

    /// Load a configuration file, choosing the format by extension
    ///
    /// `.json` is parsed as JSON, everything else as YAML.
    ///
    /// # Errors
    ///
    /// [`EnvError::Io`] if the file cannot be read, [`EnvError::Config`] if it
    /// does not parse.
    pub fn load(path: &Path) -> Result<Self, EnvError> {
        let text = std::fs::read_to_string(path).map_err(|e| EnvError::io(path, e))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_empty_yaml_is_default() -> TestResult {
        let config = BootenvConfig::from_yaml_str("{}")?;
        assert_eq!(config, BootenvConfig::default());
        assert_eq!(config.state_key, "ustate");
        assert_eq!(config.bootloader, None);
        Ok(())
    }

    #[test]
    fn test_partial_yaml() -> TestResult {
        let config = BootenvConfig::from_yaml_str(
            "bootloader: uboot\nuboot:\n  fw_env_config: /tmp/fw_env.config\n  lock_file: null\nlimits:\n  max_value_len: 64\n",
        )?;
        assert_eq!(config.bootloader.as_deref(), Some("uboot"));
        assert_eq!(config.uboot.fw_env_config, PathBuf::from("/tmp/fw_env.config"));
        assert_eq!(config.uboot.lock_file, None);
        assert_eq!(
            config.uboot.default_env,
            Some(PathBuf::from("/etc/u-boot-initial-env"))
        );
        assert_eq!(config.limits.max_value_len, 64);
        assert_eq!(config.limits.max_name_len, 255);
        assert_eq!(config.efivars.vendor_guid, None);
        Ok(())
    }

    #[test]
    fn test_efivars_vendor_guid() -> TestResult {
        let config = BootenvConfig::from_yaml_str(
            "efivars:\n  vendor_guid: 8a4e2c1d-5b3f-4e6a-9d7c-0f1e2d3c4b5a\n",
        )?;
        assert_eq!(
            config.efivars.vendor_guid.as_deref(),
            Some("8a4e2c1d-5b3f-4e6a-9d7c-0f1e2d3c4b5a")
        );
        assert_eq!(config.efivars.root, PathBuf::from("/sys/firmware/efi/efivars"));
        Ok(())
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = BootenvConfig::from_yaml_str("bootloder: uboot\n");
        assert!(matches!(result, Err(EnvError::Config(_))));
    }

    #[test]
    fn test_load_by_extension() -> TestResult {
        let dir = tempfile::tempdir()?;

        let json = dir.path().join("bootenv.json");
        std::fs::write(&json, r#"{"bootloader": "grub", "state_key": "upgrade_state"}"#)?;
        let config = BootenvConfig::load(&json)?;
        assert_eq!(config.bootloader.as_deref(), Some("grub"));
        assert_eq!(config.state_key, "upgrade_state");

        let yaml = dir.path().join("bootenv.yaml");
        std::fs::write(&yaml, "bootloader: efivars\n")?;
        assert_eq!(BootenvConfig::load(&yaml)?.bootloader.as_deref(), Some("efivars"));
        Ok(())
    }

    #[test]
    fn test_load_missing_file() {
        let result = BootenvConfig::load(Path::new("/nonexistent/bootenv.yaml"));
        assert!(matches!(result, Err(EnvError::Io { .. })));
    }
}
