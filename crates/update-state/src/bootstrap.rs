//! Startup wiring from configuration to a ready state manager

use bootstate_bootenv::{
    BootenvConfig, GlobalDispatch, global, register_builtin_backends, set_bootloader,
};
use tracing::{error, info, warn};

use crate::error::StateError;
use crate::manager::StateManager;

/// Populate the process-wide registry and select the configured bootloader
///
/// Built-in backends are registered only if the registry is still empty, so
/// backends registered earlier by the application are kept. Without a
/// configured bootloader nothing is selected and every state operation fails
/// with `NotConfigured` until one is.
///
/// # Errors
///
/// [`StateError::Backend`] if registration fails or the configured
/// bootloader is unknown.
pub fn bootstrap(config: &BootenvConfig) -> Result<StateManager<GlobalDispatch>, StateError> {
    {
        let mut registry = global().write();
        if registry.is_empty() {
            register_builtin_backends(&mut registry, config)
                .inspect_err(|e| error!(error = %e, "Failed to register bootloader backends"))?;
        }
        registry.log_registered();
    }

    match config.bootloader.as_deref() {
        Some(name) => {
            set_bootloader(name)
                .inspect_err(|e| error!(bootloader = name, error = %e, "Failed to select bootloader"))?;
        }
        None => warn!("No bootloader configured"),
    }

    let manager = StateManager::with_key(GlobalDispatch, &config.state_key);
    info!(key = manager.key(), "Update state manager ready");
    Ok(manager)
}
