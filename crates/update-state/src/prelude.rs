//! Convenience re-exports for common update-state types

pub use crate::bootstrap::bootstrap;
pub use crate::error::StateError;
pub use crate::manager::{StateManager, normalize_key};
pub use crate::nonblocking::AsyncStateManager;
pub use crate::state::UpdateState;
pub use bootstate_bootenv::{BootenvConfig, BootloaderBackend, DEFAULT_STATE_KEY, EnvError};
