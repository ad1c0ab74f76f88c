//! `fw_env.config` parsing
//!
//! Each non-comment line describes one copy of the environment:
//!
//! ```text
//! # device        offset   env-size  [sector-size  [nsectors]]
//! /dev/mtd1       0x0000   0x4000    0x20000       1
//! /dev/mtd2       0x0000   0x4000    0x20000       1
//! ```
//!
//! Two lines select the redundant layout. Numbers are decimal or `0x` hex.

use std::path::PathBuf;

use crate::error::FormatError;
use crate::record::Layout;

/// Smallest environment that can hold a redundant header and an empty payload
pub const MIN_ENV_SIZE: usize = 8;

/// One copy of the environment as described by a config line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvDevice {
    /// Device or file holding this copy
    pub path: PathBuf,
    /// Byte offset of the copy inside the device
    pub offset: u64,
    /// Size of the whole record (header included)
    pub env_size: usize,
    /// Erase-block size; defaults to `env_size`
    pub sector_size: usize,
    /// Number of erase blocks reserved for this copy; defaults to 1
    pub sectors: u32,
}

/// Parsed `fw_env.config`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FwEnvConfig {
    devices: Vec<EnvDevice>,
}

impl FwEnvConfig {
    /// Build a configuration from already-known devices
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::Config`] unless one or two devices with equal
    /// environment sizes are given.
    pub fn new(devices: Vec<EnvDevice>) -> Result<Self, FormatError> {
        let config = Self { devices };
        config.validate(0)?;
        Ok(config)
    }

    /// Parse the text of a `fw_env.config` file
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::Config`] naming the offending line.
    pub fn parse(text: &str) -> Result<Self, FormatError> {
        let mut devices = Vec::new();
        let mut last_line = 0;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index.saturating_add(1);
            last_line = line_no;
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }
            if devices.len() == 2 {
                return Err(config_error(line_no, "more than two environment copies"));
            }
            devices.push(parse_device_line(line, line_no)?);
        }

        let config = Self { devices };
        config.validate(last_line)?;
        Ok(config)
    }

    fn validate(&self, line: usize) -> Result<(), FormatError> {
        match self.devices.as_slice() {
            [] => Err(config_error(line, "no environment device configured")),
            [_] => Ok(()),
            [a, b] if a.env_size != b.env_size => Err(config_error(
                line,
                format!(
                    "redundant copies differ in size ({:#x} vs {:#x})",
                    a.env_size, b.env_size
                ),
            )),
            [_, _] => Ok(()),
            _ => Err(config_error(line, "more than two environment copies")),
        }
    }

    /// Configured copies, in file order (copy A first)
    pub fn devices(&self) -> &[EnvDevice] {
        &self.devices
    }

    /// Whether two copies are configured
    pub fn is_redundant(&self) -> bool {
        self.devices.len() == 2
    }

    /// Record layout implied by the number of copies
    pub fn layout(&self) -> Layout {
        if self.is_redundant() {
            Layout::Redundant
        } else {
            Layout::Single
        }
    }

    /// Record size shared by all copies
    pub fn env_size(&self) -> usize {
        self.devices.first().map_or(0, |d| d.env_size)
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => line.get(..pos).unwrap_or(line),
        None => line,
    }
}

fn parse_device_line(line: &str, line_no: usize) -> Result<EnvDevice, FormatError> {
    let fields: Vec<&str> = line.split_whitespace().collect();

    let (path, offset, env_size, rest) = match fields.as_slice() {
        [path, offset, env_size, rest @ ..] if rest.len() <= 2 => (*path, *offset, *env_size, rest),
        _ => {
            return Err(config_error(
                line_no,
                format!("expected 3 to 5 fields, found {}", fields.len()),
            ));
        }
    };

    let offset = parse_number(offset, line_no, "offset")?;
    let env_size = to_usize(parse_number(env_size, line_no, "env-size")?, line_no)?;
    if env_size < MIN_ENV_SIZE {
        return Err(config_error(
            line_no,
            format!("env-size {env_size} is smaller than {MIN_ENV_SIZE} bytes"),
        ));
    }

    let sector_size = match rest.first() {
        Some(field) => to_usize(parse_number(field, line_no, "sector-size")?, line_no)?,
        None => env_size,
    };
    if sector_size == 0 {
        return Err(config_error(line_no, "sector-size must not be zero"));
    }

    let sectors = match rest.get(1) {
        Some(field) => u32::try_from(parse_number(field, line_no, "nsectors")?)
            .map_err(|e| config_error(line_no, format!("nsectors out of range: {e}")))?,
        None => 1,
    };
    if sectors == 0 {
        return Err(config_error(line_no, "nsectors must not be zero"));
    }

    Ok(EnvDevice {
        path: PathBuf::from(path),
        offset,
        env_size,
        sector_size,
        sectors,
    })
}

/// Parse a decimal or `0x`-prefixed hexadecimal number
fn parse_number(field: &str, line_no: usize, what: &str) -> Result<u64, FormatError> {
    let parsed = match field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => field.parse::<u64>(),
    };
    parsed.map_err(|e| config_error(line_no, format!("invalid {what} '{field}': {e}")))
}

fn to_usize(value: u64, line_no: usize) -> Result<usize, FormatError> {
    usize::try_from(value).map_err(|e| config_error(line_no, format!("{value} out of range: {e}")))
}

fn config_error(line: usize, reason: impl Into<String>) -> FormatError {
    FormatError::Config {
        line,
        reason: reason.into(),
    }
}
