//! Error types for update-state operations

use bootstate_bootenv::EnvError;
use thiserror::Error;

use crate::state::UpdateState;

/// Errors reported by the state manager
#[derive(Error, Debug)]
pub enum StateError {
    /// The state can be observed but never written
    #[error("State {0} cannot be written")]
    InvalidState(UpdateState),

    /// The boot environment failed
    #[error(transparent)]
    Backend(#[from] EnvError),

    /// The blocking worker running the operation was lost
    #[error("State operation aborted: {0}")]
    Aborted(String),
}

impl StateError {
    /// Backend error, if this came from the boot environment
    pub fn as_env_error(&self) -> Option<&EnvError> {
        match self {
            StateError::Backend(e) => Some(e),
            _ => None,
        }
    }
}
