//! Backend registry and dispatch
//!
//! Backends are registered once at startup, one of them is selected from
//! configuration, and from then on every `env_*` call is forwarded to the
//! selected backend. [`Registry`] is the plain data structure; the functions
//! at module level operate on the process-wide instance.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use tracing::{debug, info, trace};

use crate::backend::BootloaderBackend;
use crate::error::EnvError;

/// A registered backend
pub struct BackendEntry {
    name: String,
    backend: Option<Arc<dyn BootloaderBackend>>,
}

impl BackendEntry {
    /// Registered name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a usable implementation is attached
    pub fn is_loaded(&self) -> bool {
        self.backend.is_some()
    }
}

impl std::fmt::Debug for BackendEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendEntry")
            .field("name", &self.name)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// Insertion-ordered set of backends with at most one selected
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<BackendEntry>,
    current: Option<usize>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a backend
    ///
    /// `None` records a backend whose platform support is missing; it is
    /// listed but can never be selected. Duplicate names are accepted and
    /// [`select`](Self::select) picks the first loaded one.
    ///
    /// # Errors
    ///
    /// [`EnvError::OutOfMemory`] if the entry cannot be allocated.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        backend: Option<Arc<dyn BootloaderBackend>>,
    ) -> Result<(), EnvError> {
        self.entries
            .try_reserve(1)
            .map_err(|e| {
                debug!(error = %e, "Registry allocation failed");
                EnvError::OutOfMemory
            })?;
        let name = name.into();
        debug!(backend = %name, loaded = backend.is_some(), "Registered bootloader backend");
        self.entries.push(BackendEntry { name, backend });
        Ok(())
    }

    /// Make the named backend current
    ///
    /// # Errors
    ///
    /// [`EnvError::UnknownBackend`] if the name is empty or no loaded backend
    /// carries it; the previous selection is kept.
    pub fn select(&mut self, name: &str) -> Result<(), EnvError> {
        if name.is_empty() {
            return Err(EnvError::UnknownBackend(String::new()));
        }
        let index = self
            .entries
            .iter()
            .position(|entry| entry.is_loaded() && entry.name == name)
            .ok_or_else(|| EnvError::UnknownBackend(name.to_string()))?;
        self.current = Some(index);
        info!(backend = name, "Selected bootloader backend");
        Ok(())
    }

    /// Whether a backend is selected and carries this name
    pub fn is_current(&self, name: &str) -> bool {
        self.current_name() == Some(name)
    }

    /// Name of the selected backend
    pub fn current_name(&self) -> Option<&str> {
        self.current_entry().map(BackendEntry::name)
    }

    /// `(name, loaded)` for every registered backend, in registration order
    pub fn list(&self) -> impl Iterator<Item = (&str, bool)> + '_ {
        self.entries
            .iter()
            .map(|entry| (entry.name(), entry.is_loaded()))
    }

    /// Number of registered backends
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Trace the registered backends
    pub fn log_registered(&self) {
        trace!("Registered bootloaders:");
        for (name, loaded) in self.list() {
            trace!(
                "\t{name}\t{}",
                if loaded { "loaded." } else { "not available." }
            );
        }
    }

    /// Handle to the selected backend
    ///
    /// # Errors
    ///
    /// [`EnvError::NotConfigured`] if nothing is selected.
    pub fn current_backend(&self) -> Result<Arc<dyn BootloaderBackend>, EnvError> {
        self.current_entry()
            .and_then(|entry| entry.backend.clone())
            .ok_or(EnvError::NotConfigured)
    }

    fn current_entry(&self) -> Option<&BackendEntry> {
        self.current.and_then(|index| self.entries.get(index))
    }
}

impl BootloaderBackend for Registry {
    fn env_get(&self, name: &str) -> Result<Option<String>, EnvError> {
        self.current_backend()?.env_get(name)
    }

    fn env_set(&self, name: &str, value: &str) -> Result<(), EnvError> {
        self.current_backend()?.env_set(name, value)
    }

    fn env_unset(&self, name: &str) -> Result<(), EnvError> {
        self.current_backend()?.env_unset(name)
    }

    fn apply_list(&self, script: &Path) -> Result<(), EnvError> {
        self.current_backend()?.apply_list(script)
    }
}

static GLOBAL_REGISTRY: LazyLock<RwLock<Registry>> = LazyLock::new(|| RwLock::new(Registry::new()));

/// The process-wide registry
///
/// Populated during startup and read-only afterwards; the lock exists to make
/// the static shareable, not to arbitrate concurrent registration.
pub fn global() -> &'static RwLock<Registry> {
    &GLOBAL_REGISTRY
}

/// Register a backend in the process-wide registry
///
/// # Errors
///
/// See [`Registry::register`].
pub fn register_bootloader(
    name: impl Into<String>,
    backend: Option<Arc<dyn BootloaderBackend>>,
) -> Result<(), EnvError> {
    GLOBAL_REGISTRY.write().register(name, backend)
}

/// Select the process-wide backend
///
/// # Errors
///
/// See [`Registry::select`].
pub fn set_bootloader(name: &str) -> Result<(), EnvError> {
    GLOBAL_REGISTRY.write().select(name)
}

/// Whether the process-wide selection carries this name
pub fn is_bootloader(name: &str) -> bool {
    GLOBAL_REGISTRY.read().is_current(name)
}

/// Name of the process-wide selection
pub fn get_bootloader() -> Option<String> {
    GLOBAL_REGISTRY.read().current_name().map(str::to_string)
}

/// Snapshot of the process-wide registry as `(name, loaded)` pairs
pub fn registered_bootloaders() -> Vec<(String, bool)> {
    GLOBAL_REGISTRY
        .read()
        .list()
        .map(|(name, loaded)| (name.to_string(), loaded))
        .collect()
}

/// Trace the process-wide registry
pub fn print_registered_bootloaders() {
    GLOBAL_REGISTRY.read().log_registered();
}

/// Dispatch to the process-wide selected backend
///
/// The registry lock is released before the backend runs, so no lock is held
/// across medium I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalDispatch;

impl GlobalDispatch {
    fn backend() -> Result<Arc<dyn BootloaderBackend>, EnvError> {
        GLOBAL_REGISTRY.read().current_backend()
    }
}

impl BootloaderBackend for GlobalDispatch {
    fn env_get(&self, name: &str) -> Result<Option<String>, EnvError> {
        Self::backend()?.env_get(name)
    }

    fn env_set(&self, name: &str, value: &str) -> Result<(), EnvError> {
        Self::backend()?.env_set(name, value)
    }

    fn env_unset(&self, name: &str) -> Result<(), EnvError> {
        Self::backend()?.env_unset(name)
    }

    fn apply_list(&self, script: &Path) -> Result<(), EnvError> {
        Self::backend()?.apply_list(script)
    }
}

/// Read a variable through the process-wide selection
///
/// # Errors
///
/// [`EnvError::NotConfigured`] without a selection, otherwise the backend's
/// error unchanged.
pub fn env_get(name: &str) -> Result<Option<String>, EnvError> {
    GlobalDispatch.env_get(name)
}

/// Set a variable through the process-wide selection
///
/// # Errors
///
/// As [`env_get`].
pub fn env_set(name: &str, value: &str) -> Result<(), EnvError> {
    GlobalDispatch.env_set(name, value)
}

/// Remove a variable through the process-wide selection
///
/// # Errors
///
/// As [`env_get`].
pub fn env_unset(name: &str) -> Result<(), EnvError> {
    GlobalDispatch.env_unset(name)
}

/// Apply a script through the process-wide selection
///
/// # Errors
///
/// As [`env_get`].
pub fn apply_list(script: &Path) -> Result<(), EnvError> {
    GlobalDispatch.apply_list(script)
}
