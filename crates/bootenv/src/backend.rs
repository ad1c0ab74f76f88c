//! Capability contract shared by all bootloader backends

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EnvError;

/// Default maximum variable-name length in bytes
pub const DEFAULT_MAX_NAME_LEN: usize = 255;

/// Default maximum value length in bytes
pub const DEFAULT_MAX_VALUE_LEN: usize = 4096;

/// The four operations every boot-environment backend provides
///
/// All operations may block on the storage medium. Once a write has started
/// it runs to completion (or fails leaving the previous contents readable);
/// implementations have no cancellation points inside a write.
pub trait BootloaderBackend: Send + Sync {
    /// Read a variable, `Ok(None)` if it is not set
    fn env_get(&self, name: &str) -> Result<Option<String>, EnvError>;

    /// Set a variable atomically
    fn env_set(&self, name: &str, value: &str) -> Result<(), EnvError>;

    /// Remove a variable; removing a missing variable succeeds
    fn env_unset(&self, name: &str) -> Result<(), EnvError>;

    /// Apply a `NAME=VALUE` / `NAME` script, as one write where supported
    fn apply_list(&self, script: &Path) -> Result<(), EnvError>;
}

impl<T: BootloaderBackend + ?Sized> BootloaderBackend for Arc<T> {
    fn env_get(&self, name: &str) -> Result<Option<String>, EnvError> {
        (**self).env_get(name)
    }

    fn env_set(&self, name: &str, value: &str) -> Result<(), EnvError> {
        (**self).env_set(name, value)
    }

    fn env_unset(&self, name: &str) -> Result<(), EnvError> {
        (**self).env_unset(name)
    }

    fn apply_list(&self, script: &Path) -> Result<(), EnvError> {
        (**self).apply_list(script)
    }
}

/// Name and value length limits of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvLimits {
    /// Longest accepted variable name in bytes
    pub max_name_len: usize,
    /// Longest accepted value in bytes
    pub max_value_len: usize,
}

impl Default for EnvLimits {
    fn default() -> Self {
        Self {
            max_name_len: DEFAULT_MAX_NAME_LEN,
            max_value_len: DEFAULT_MAX_VALUE_LEN,
        }
    }
}

impl EnvLimits {
    /// Validate a variable name
    ///
    /// # Errors
    ///
    /// [`EnvError::InvalidArgument`] for empty names or names containing `=`
    /// or NUL, [`EnvError::TooLarge`] for names over the limit.
    pub fn check_name(&self, name: &str) -> Result<(), EnvError> {
        if name.is_empty() {
            return Err(EnvError::InvalidArgument(
                "empty variable name".to_string(),
            ));
        }
        if name.contains(['=', '\0']) {
            return Err(EnvError::InvalidArgument(format!(
                "variable name {name:?} contains '=' or NUL"
            )));
        }
        if name.len() > self.max_name_len {
            return Err(EnvError::TooLarge {
                what: "name",
                len: name.len(),
                max: self.max_name_len,
            });
        }
        Ok(())
    }

    /// Validate a value
    ///
    /// # Errors
    ///
    /// [`EnvError::InvalidArgument`] for values containing NUL,
    /// [`EnvError::TooLarge`] for values over the limit.
    pub fn check_value(&self, value: &str) -> Result<(), EnvError> {
        if value.contains('\0') {
            return Err(EnvError::InvalidArgument(
                "value contains NUL".to_string(),
            ));
        }
        if value.len() > self.max_value_len {
            return Err(EnvError::TooLarge {
                what: "value",
                len: value.len(),
                max: self.max_value_len,
            });
        }
        Ok(())
    }

    /// Validate a name/value pair
    ///
    /// # Errors
    ///
    /// See [`check_name`](Self::check_name) and
    /// [`check_value`](Self::check_value).
    pub fn check(&self, name: &str, value: &str) -> Result<(), EnvError> {
        self.check_name(name)?;
        self.check_value(value)
    }
}
