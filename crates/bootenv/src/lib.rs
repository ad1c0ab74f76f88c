//! Bootloader environment access for update agents
//!
//! An update agent talks to whatever bootloader the board runs through one
//! small contract, [`BootloaderBackend`]: get, set and unset a variable, and
//! apply a batch script. This crate provides:
//!
//! - [`backend`]: the contract and name/value limits
//! - [`adapters`]: U-Boot, GRUB, EFI variables, JSON file and in-memory
//!   backends
//! - [`registry`]: backend registry, process-wide selection and dispatch
//! - [`script`]: the `NAME=VALUE` / `NAME` batch script format
//! - [`config`]: runtime configuration (YAML or JSON)
//! - [`lock`]: advisory lock shared with the U-Boot userspace tools
//! - [`error`]: error types
//!
//! # Example
//!
//! ```ignore
//! use bootstate_bootenv::prelude::*;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BootenvConfig::load(std::path::Path::new("/etc/bootstate.yaml"))?;
//! {
//!     let mut registry = global().write();
//!     register_builtin_backends(&mut registry, &config)?;
//! }
//! set_bootloader("uboot")?;
//!
//! env_set("ustate", "1")?;
//! assert_eq!(env_get("ustate")?.as_deref(), Some("1"));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod adapters;
mod atomic;
pub mod backend;
pub mod config;
pub mod error;
pub mod lock;
pub mod prelude;
pub mod registry;
pub mod script;
#[cfg(target_os = "linux")]
mod sys;

pub use adapters::{EfiVars, FileEnv, GrubEnv, MemoryEnv, UBootEnv, register_builtin_backends};
pub use backend::{BootloaderBackend, DEFAULT_MAX_NAME_LEN, DEFAULT_MAX_VALUE_LEN, EnvLimits};
pub use bootstate_uboot_format::Environment;
pub use config::{BootenvConfig, DEFAULT_STATE_KEY};
pub use error::{EnvError, ErrorKind};
pub use lock::EnvLock;
pub use registry::{
    GlobalDispatch, Registry, apply_list, env_get, env_set, env_unset, get_bootloader, global,
    is_bootloader, print_registered_bootloaders, register_bootloader, registered_bootloaders,
    set_bootloader,
};
pub use script::{ScriptOp, parse_script};
