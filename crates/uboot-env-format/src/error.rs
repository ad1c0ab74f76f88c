//! Error types for the U-Boot environment format

use thiserror::Error;

/// Errors produced while parsing or encoding U-Boot environment data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Record failed validation (CRC mismatch, malformed entries)
    #[error("Corrupt environment record: {0}")]
    Corrupt(String),

    /// Name or value longer than the permitted maximum
    #[error("{what} is too long: {len} bytes (max: {max})")]
    TooLarge {
        /// Which item exceeded its limit ("name" or "value")
        what: &'static str,
        /// Actual length in bytes
        len: usize,
        /// Maximum permitted length in bytes
        max: usize,
    },

    /// Serialized environment does not fit the data region
    #[error("Environment does not fit: {needed} bytes needed, {available} available")]
    OutOfSpace {
        /// Bytes required by the serialized environment
        needed: usize,
        /// Bytes available in the data region
        available: usize,
    },

    /// Name or value that cannot be represented in the record format
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed `fw_env.config` line
    #[error("fw_env.config line {line}: {reason}")]
    Config {
        /// 1-based line number
        line: usize,
        /// What was wrong with the line
        reason: String,
    },
}
