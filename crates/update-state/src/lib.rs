//! Persistent update state for A/B firmware updates
//!
//! The update agent records where an update stands in one variable of the
//! bootloader environment (`ustate` by default). The boot code reads the
//! same variable to decide between the new and the old slot, and after the
//! reboot the agent reads it back to learn how the boot went.
//!
//! - [`state`]: the state enumeration and its one-byte encoding
//! - [`manager`]: save, read and reset through any [`BootloaderBackend`]
//! - [`nonblocking`]: the same operations for async callers
//! - [`bootstrap`]: configuration to a ready manager over the global registry
//! - [`error`]: error types
//!
//! # Example
//!
//! ```ignore
//! use bootstate_update_state::prelude::*;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BootenvConfig::load(std::path::Path::new("/etc/bootstate.yaml"))?;
//! let manager = bootstrap(&config)?;
//!
//! match manager.get_state() {
//!     UpdateState::Testing => manager.save_state("", UpdateState::Ok)?,
//!     UpdateState::Error => return Err("boot environment unreadable".into()),
//!     _ => {}
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`BootloaderBackend`]: bootstate_bootenv::BootloaderBackend

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod bootstrap;
pub mod error;
pub mod manager;
pub mod nonblocking;
pub mod prelude;
pub mod state;

pub use bootstrap::bootstrap;
pub use error::StateError;
pub use manager::{StateManager, normalize_key};
pub use nonblocking::AsyncStateManager;
pub use state::{ALL_STATES, InvalidStateByte, UnknownState, UpdateState};
