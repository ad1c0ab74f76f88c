//! CRC32-protected environment records

use crate::environment::Environment;
use crate::error::FormatError;

/// Size of the CRC32 field at the start of every record
pub const CRC_LEN: usize = 4;

/// Record layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// One copy: `[crc][data]`
    Single,
    /// Two copies: `[crc][flags][data]`
    Redundant,
}

impl Layout {
    /// Bytes in front of the data region
    pub fn header_len(self) -> usize {
        match self {
            Layout::Single => CRC_LEN,
            Layout::Redundant => CRC_LEN + 1,
        }
    }

    /// Data region size for a record of `env_size` bytes
    pub fn data_size(self, env_size: usize) -> usize {
        env_size.saturating_sub(self.header_len())
    }
}

/// One decoded, CRC-verified copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvCopy {
    /// Flags counter (redundant layout only)
    pub flags: Option<u8>,
    /// Parsed variables
    pub env: Environment,
}

/// CRC32 (IEEE) as used by U-Boot
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Decode and verify one raw record
///
/// # Errors
///
/// Returns [`FormatError::Corrupt`] if the record is truncated, the CRC does
/// not match the data region, or the data region is malformed.
pub fn decode_copy(layout: Layout, raw: &[u8]) -> Result<EnvCopy, FormatError> {
    let (header, data) = raw
        .split_at_checked(layout.header_len())
        .ok_or_else(|| FormatError::Corrupt(format!("record truncated to {} bytes", raw.len())))?;

    let stored = header
        .first_chunk::<CRC_LEN>()
        .map(|bytes| u32::from_le_bytes(*bytes))
        .ok_or_else(|| FormatError::Corrupt("record header truncated".to_string()))?;
    let computed = crc32(data);
    if stored != computed {
        return Err(FormatError::Corrupt(format!(
            "CRC mismatch: stored {stored:#010x}, computed {computed:#010x}"
        )));
    }

    let flags = match layout {
        Layout::Single => None,
        Layout::Redundant => header.get(CRC_LEN).copied(),
    };

    Ok(EnvCopy {
        flags,
        env: Environment::decode(data)?,
    })
}

/// Encode one record of exactly `env_size` bytes
///
/// `flags` is written only for [`Layout::Redundant`].
///
/// # Errors
///
/// Returns [`FormatError::OutOfSpace`] if the environment does not fit.
pub fn encode_copy(
    layout: Layout,
    env_size: usize,
    flags: u8,
    env: &Environment,
) -> Result<Vec<u8>, FormatError> {
    let data = env.encode(layout.data_size(env_size))?;

    let mut raw = Vec::with_capacity(env_size);
    raw.extend_from_slice(&crc32(&data).to_le_bytes());
    if layout == Layout::Redundant {
        raw.push(flags);
    }
    raw.extend_from_slice(&data);
    Ok(raw)
}
