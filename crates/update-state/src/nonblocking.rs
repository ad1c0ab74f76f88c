//! Async front end for the state manager
//!
//! Backends block on flash I/O for hundreds of milliseconds, so each
//! operation runs on tokio's blocking pool. Dropping the returned future (for
//! example on a timeout) stops waiting but does not stop a write that has
//! already started; the backend finishes it in the background.

use std::sync::Arc;

use bootstate_bootenv::BootloaderBackend;
use tracing::error;

use crate::error::StateError;
use crate::manager::StateManager;
use crate::state::UpdateState;

/// Shareable async wrapper around [`StateManager`]
#[derive(Debug)]
pub struct AsyncStateManager<B> {
    inner: Arc<StateManager<B>>,
}

impl<B> Clone for AsyncStateManager<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: BootloaderBackend + 'static> AsyncStateManager<B> {
    /// Wrap a manager
    pub fn new(manager: StateManager<B>) -> Self {
        Self {
            inner: Arc::new(manager),
        }
    }

    /// The wrapped manager
    pub fn manager(&self) -> &StateManager<B> {
        &self.inner
    }

    async fn run<T, F>(&self, op: F) -> Result<T, StateError>
    where
        T: Send + 'static,
        F: FnOnce(&StateManager<B>) -> Result<T, StateError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&inner))
            .await
            .map_err(|e| {
                error!(error = %e, "State operation worker failed");
                StateError::Aborted(e.to_string())
            })?
    }

    /// See [`StateManager::save_state`]
    ///
    /// # Errors
    ///
    /// As [`StateManager::save_state`], or [`StateError::Aborted`] if the
    /// worker panicked.
    pub async fn save_state(&self, key: &str, state: UpdateState) -> Result<(), StateError> {
        let key = key.to_string();
        self.run(move |manager| manager.save_state(&key, state)).await
    }

    /// See [`StateManager::read_state`]
    ///
    /// # Errors
    ///
    /// As [`StateManager::read_state`], or [`StateError::Aborted`].
    pub async fn read_state(&self, key: &str) -> Result<UpdateState, StateError> {
        let key = key.to_string();
        self.run(move |manager| manager.read_state(&key)).await
    }

    /// See [`StateManager::reset_state`]
    ///
    /// # Errors
    ///
    /// As [`StateManager::reset_state`], or [`StateError::Aborted`].
    pub async fn reset_state(&self, key: &str) -> Result<(), StateError> {
        let key = key.to_string();
        self.run(move |manager| manager.reset_state(&key)).await
    }

    /// See [`StateManager::get_state`]
    pub async fn get_state(&self) -> UpdateState {
        self.run(|manager| Ok(manager.get_state()))
            .await
            .unwrap_or(UpdateState::Error)
    }
}
