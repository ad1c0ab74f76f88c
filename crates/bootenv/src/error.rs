//! Error types for bootloader environment operations

use std::path::{Path, PathBuf};

use bootstate_uboot_format::FormatError;
use thiserror::Error;

/// Errors reported by backends and the dispatch layer
///
/// A missing variable is not an error: [`env_get`] reports it as `Ok(None)`.
///
/// [`env_get`]: crate::backend::BootloaderBackend::env_get
#[derive(Error, Debug)]
pub enum EnvError {
    /// No backend has been selected
    #[error("No bootloader backend selected")]
    NotConfigured,

    /// No loaded backend is registered under this name
    #[error("Bootloader backend not found: {0}")]
    UnknownBackend(String),

    /// Reading or writing the storage medium failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Device or file being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Stored data failed validation (CRC mismatch, malformed record)
    #[error("Corrupt environment: {0}")]
    Corrupt(String),

    /// Name or value exceeds the backend limit
    #[error("{what} is too long: {len} bytes (max: {max})")]
    TooLarge {
        /// Which item exceeded its limit ("name" or "value")
        what: &'static str,
        /// Actual length in bytes
        len: usize,
        /// Maximum permitted length in bytes
        max: usize,
    },

    /// Environment storage is full
    #[error("Environment full: {needed} bytes needed, {available} available")]
    OutOfSpace {
        /// Bytes required
        needed: usize,
        /// Bytes available
        available: usize,
    },

    /// Rejected input (bad name, bad script line)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Allocation failed
    #[error("Out of memory")]
    OutOfMemory,

    /// Backend configuration missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of [`EnvError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No backend selected
    NotConfigured,
    /// Named item does not exist
    NotFound,
    /// Medium read/write failed
    Io,
    /// CRC mismatch or malformed record
    Corrupt,
    /// Name or value too long
    TooLarge,
    /// Storage full
    OutOfSpace,
    /// Rejected input or configuration
    InvalidArgument,
    /// Allocation failed
    OutOfMemory,
}

impl EnvError {
    /// Build an I/O error for `path`
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        EnvError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            EnvError::NotConfigured => ErrorKind::NotConfigured,
            EnvError::UnknownBackend(_) => ErrorKind::NotFound,
            EnvError::Io { .. } => ErrorKind::Io,
            EnvError::Corrupt(_) => ErrorKind::Corrupt,
            EnvError::TooLarge { .. } => ErrorKind::TooLarge,
            EnvError::OutOfSpace { .. } => ErrorKind::OutOfSpace,
            EnvError::InvalidArgument(_) | EnvError::Config(_) => ErrorKind::InvalidArgument,
            EnvError::OutOfMemory => ErrorKind::OutOfMemory,
        }
    }

    /// Whether the error points at a setup mistake rather than a runtime fault
    pub fn is_configuration_bug(&self) -> bool {
        matches!(
            self,
            EnvError::NotConfigured | EnvError::UnknownBackend(_) | EnvError::Config(_)
        )
    }
}

impl From<FormatError> for EnvError {
    fn from(e: FormatError) -> Self {
        match e {
            FormatError::Corrupt(reason) => EnvError::Corrupt(reason),
            FormatError::TooLarge { what, len, max } => EnvError::TooLarge { what, len, max },
            FormatError::OutOfSpace { needed, available } => {
                EnvError::OutOfSpace { needed, available }
            }
            FormatError::InvalidArgument(reason) => EnvError::InvalidArgument(reason),
            e @ FormatError::Config { .. } => EnvError::Config(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(EnvError::NotConfigured.kind(), ErrorKind::NotConfigured);
        assert_eq!(
            EnvError::UnknownBackend("x".to_string()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            EnvError::io("/dev/null", std::io::Error::other("boom")).kind(),
            ErrorKind::Io
        );
        assert_eq!(EnvError::Config("x".to_string()).kind(), ErrorKind::InvalidArgument);
        assert_eq!(EnvError::OutOfMemory.kind(), ErrorKind::OutOfMemory);
    }

    #[test]
    fn test_configuration_bug() {
        assert!(EnvError::NotConfigured.is_configuration_bug());
        assert!(!EnvError::Corrupt("crc".to_string()).is_configuration_bug());
    }

    #[test]
    fn test_from_format_error() {
        let err: EnvError = FormatError::OutOfSpace {
            needed: 10,
            available: 8,
        }
        .into();
        assert!(matches!(
            err,
            EnvError::OutOfSpace {
                needed: 10,
                available: 8
            }
        ));

        let err: EnvError = FormatError::Config {
            line: 2,
            reason: "bad".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Configuration error: fw_env.config line 2: bad");
    }
}
