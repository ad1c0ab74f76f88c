//! Convenience re-exports for common U-Boot environment types

pub use crate::config::{EnvDevice, FwEnvConfig};
pub use crate::environment::Environment;
pub use crate::error::FormatError;
pub use crate::record::{EnvCopy, Layout, crc32, decode_copy, encode_copy};
pub use crate::redundancy::{CopyId, Selection, is_newer, select_copy};
