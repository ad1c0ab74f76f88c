//! On-media format of the U-Boot environment.
//!
//! This crate is the I/O-free half of the U-Boot integration. It knows how the
//! environment is laid out on the storage medium and nothing about how the
//! medium is reached:
//!
//! - [`config`]: `fw_env.config` tokenizer (device, offset, sizes)
//! - [`environment`]: ordered `NAME=VALUE` map with capacity accounting
//! - [`record`]: CRC32-protected single and redundant records
//! - [`redundancy`]: flags-counter arithmetic and copy selection
//! - [`error`]: error types
//!
//! # Record layout
//!
//! ```text
//! single:    [crc32 LE (4)][data ............................]
//! redundant: [crc32 LE (4)][flags (1)][data .................]
//! data:      NAME=VALUE\0NAME=VALUE\0\0\xff\xff...
//! ```
//!
//! The CRC covers the data region only; the flags byte of the redundant layout
//! is outside of it.

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod environment;
pub mod error;
pub mod prelude;
pub mod record;
pub mod redundancy;

pub use config::{EnvDevice, FwEnvConfig};
pub use environment::Environment;
pub use error::FormatError;
pub use record::{EnvCopy, Layout, crc32, decode_copy, encode_copy};
pub use redundancy::{CopyId, Selection, is_newer, select_copy};
