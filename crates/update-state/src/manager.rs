//! Persisting the update state through a bootloader backend

use bootstate_bootenv::{BootloaderBackend, DEFAULT_STATE_KEY};
use tracing::{debug, error, warn};

use crate::error::StateError;
use crate::state::UpdateState;

/// Substitute the default key for an empty one
///
/// Empty variable names corrupt some bootloader environments, so they never
/// reach the backend.
pub fn normalize_key(key: &str) -> &str {
    if key.is_empty() {
        warn!(
            default = DEFAULT_STATE_KEY,
            "Empty state key, using the default key instead"
        );
        DEFAULT_STATE_KEY
    } else {
        key
    }
}

/// Reads and writes the update state under a key of the boot environment
///
/// The manager keeps no state of its own: every call goes to the backend.
#[derive(Debug, Clone)]
pub struct StateManager<B> {
    backend: B,
    key: String,
}

impl<B: BootloaderBackend> StateManager<B> {
    /// Manager using [`DEFAULT_STATE_KEY`]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            key: DEFAULT_STATE_KEY.to_string(),
        }
    }

    /// Manager whose [`get_state`](Self::get_state) reads `key`
    ///
    /// An empty key is replaced by [`DEFAULT_STATE_KEY`].
    pub fn with_key(backend: B, key: &str) -> Self {
        Self {
            backend,
            key: normalize_key(key).to_string(),
        }
    }

    /// Key read by [`get_state`](Self::get_state)
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Underlying backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Persist `state` under `key`
    ///
    /// # Errors
    ///
    /// [`StateError::InvalidState`] for `NotAvailable` and `Error`, otherwise
    /// the backend error.
    pub fn save_state(&self, key: &str, state: UpdateState) -> Result<(), StateError> {
        if !state.is_writable() {
            error!(state = %state, "Refusing to store observation-only state");
            return Err(StateError::InvalidState(state));
        }
        let key = normalize_key(key);

        self.backend
            .env_set(key, &state.encode())
            .inspect_err(|e| error!(key, state = %state, error = %e, "Failed to save update state"))?;
        debug!(key, state = %state, "Saved update state");
        Ok(())
    }

    /// Read the state stored under `key`
    ///
    /// A missing key reads as [`UpdateState::NotAvailable`]; a value that is
    /// empty or starts with an unknown byte reads as [`UpdateState::Error`].
    ///
    /// # Errors
    ///
    /// Backend errors other than a missing key.
    pub fn read_state(&self, key: &str) -> Result<UpdateState, StateError> {
        let key = normalize_key(key);

        let value = self
            .backend
            .env_get(key)
            .inspect_err(|e| error!(key, error = %e, "Failed to read update state"))?;
        let Some(value) = value else {
            debug!(key, "No update state stored");
            return Ok(UpdateState::NotAvailable);
        };

        let state = UpdateState::from_stored(&value);
        if state == UpdateState::Error {
            error!(key, value = %value, "Stored update state is invalid");
        } else {
            debug!(key, state = %state, "Read update state");
        }
        Ok(state)
    }

    /// Remove the state stored under `key`
    ///
    /// # Errors
    ///
    /// The backend error.
    pub fn reset_state(&self, key: &str) -> Result<(), StateError> {
        let key = normalize_key(key);
        self.backend
            .env_unset(key)
            .inspect_err(|e| error!(key, error = %e, "Failed to reset update state"))?;
        debug!(key, "Reset update state");
        Ok(())
    }

    /// State under the configured key, [`UpdateState::Error`] on any failure
    pub fn get_state(&self) -> UpdateState {
        self.read_state(&self.key).unwrap_or(UpdateState::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootstate_bootenv::{EnvError, MemoryEnv};
    use std::path::Path;
    use std::sync::Arc;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    /// Backend failing every call
    struct Broken;

    impl BootloaderBackend for Broken {
        fn env_get(&self, _name: &str) -> Result<Option<String>, EnvError> {
            Err(EnvError::Corrupt("crc".to_string()))
        }
        fn env_set(&self, _name: &str, _value: &str) -> Result<(), EnvError> {
            Err(EnvError::Corrupt("crc".to_string()))
        }
        fn env_unset(&self, _name: &str) -> Result<(), EnvError> {
            Err(EnvError::Corrupt("crc".to_string()))
        }
        fn apply_list(&self, _script: &Path) -> Result<(), EnvError> {
            Err(EnvError::Corrupt("crc".to_string()))
        }
    }

    #[test]
    fn test_save_and_read() -> TestResult {
        let manager = StateManager::new(MemoryEnv::new());
        assert_eq!(manager.read_state("ustate")?, UpdateState::NotAvailable);
        manager.save_state("ustate", UpdateState::Installed)?;
        assert_eq!(manager.backend().env_get("ustate")?.as_deref(), Some("1"));
        assert_eq!(manager.read_state("ustate")?, UpdateState::Installed);
        assert_eq!(manager.get_state(), UpdateState::Installed);
        Ok(())
    }

    #[test]
    fn test_observation_states_refused() -> TestResult {
        let manager = StateManager::new(MemoryEnv::new());
        for state in [UpdateState::NotAvailable, UpdateState::Error] {
            assert!(matches!(
                manager.save_state("ustate", state),
                Err(StateError::InvalidState(s)) if s == state
            ));
        }
        assert_eq!(manager.backend().env_get("ustate")?, None);
        Ok(())
    }

    #[test]
    fn test_reset() -> TestResult {
        let manager = StateManager::new(MemoryEnv::new());
        manager.save_state("ustate", UpdateState::Testing)?;
        manager.reset_state("ustate")?;
        assert_eq!(manager.get_state(), UpdateState::NotAvailable);
        manager.reset_state("ustate")?;
        Ok(())
    }

    #[test]
    fn test_backend_failure() {
        let manager = StateManager::new(Broken);
        assert!(matches!(
            manager.read_state("ustate"),
            Err(StateError::Backend(EnvError::Corrupt(_)))
        ));
        assert_eq!(manager.get_state(), UpdateState::Error);
        assert!(matches!(
            manager.save_state("ustate", UpdateState::Ok),
            Err(StateError::Backend(_))
        ));
        assert!(matches!(manager.reset_state("ustate"), Err(StateError::Backend(_))));
    }

    #[test]
    fn test_custom_key() -> TestResult {
        let backend = Arc::new(MemoryEnv::new());
        let manager = StateManager::with_key(Arc::clone(&backend), "upgrade_available");
        assert_eq!(manager.key(), "upgrade_available");
        manager.save_state("upgrade_available", UpdateState::Wait)?;
        assert_eq!(manager.get_state(), UpdateState::Wait);
        assert_eq!(backend.env_get("ustate")?, None);
        Ok(())
    }

    #[test]
    fn test_empty_key_reads_and_resets_default() -> TestResult {
        let manager = StateManager::new(MemoryEnv::new());
        assert_eq!(manager.read_state("")?, UpdateState::NotAvailable);

        manager.save_state("ustate", UpdateState::Testing)?;
        assert_eq!(manager.read_state("")?, UpdateState::Testing);
        assert_eq!(manager.read_state("")?, manager.read_state("ustate")?);

        manager.reset_state("")?;
        assert_eq!(manager.backend().env_get("ustate")?, None);
        assert_eq!(manager.read_state("ustate")?, UpdateState::NotAvailable);
        manager.reset_state("")?;
        Ok(())
    }

    #[test]
    fn test_empty_custom_key_falls_back() {
        let manager = StateManager::with_key(MemoryEnv::new(), "");
        assert_eq!(manager.key(), DEFAULT_STATE_KEY);
    }
}
