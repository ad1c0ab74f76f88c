//! Built-in bootloader backends
//!
//! | name      | storage                                   |
//! |-----------|-------------------------------------------|
//! | `uboot`   | U-Boot environment described by `fw_env.config` |
//! | `grub`    | GRUB `grubenv` block                      |
//! | `efivars` | EFI variables via efivarfs                |
//! | `file`    | JSON document                             |
//! | `none`    | process memory                            |

use std::sync::Arc;

use tracing::debug;

use crate::backend::BootloaderBackend;
use crate::config::BootenvConfig;
use crate::error::EnvError;
use crate::registry::Registry;

pub mod efivars;
pub mod file;
pub mod grub;
mod medium;
pub mod none;
pub mod uboot;

pub use efivars::EfiVars;
pub use file::FileEnv;
pub use grub::GrubEnv;
pub use none::MemoryEnv;
pub use uboot::UBootEnv;

/// Registered name of [`UBootEnv`]
pub const UBOOT: &str = "uboot";
/// Registered name of [`GrubEnv`]
pub const GRUB: &str = "grub";
/// Registered name of [`EfiVars`]
pub const EFIVARS: &str = "efivars";
/// Registered name of [`FileEnv`]
pub const FILE: &str = "file";
/// Registered name of [`MemoryEnv`]
pub const NONE: &str = "none";

/// Register every built-in backend, configured from `config`
///
/// Backends whose platform support is missing are registered unloaded so
/// they still show up in listings.
///
/// # Errors
///
/// [`EnvError::OutOfMemory`] if the registry cannot grow.
pub fn register_builtin_backends(
    registry: &mut Registry,
    config: &BootenvConfig,
) -> Result<(), EnvError> {
    let limits = config.limits;

    let uboot: Arc<dyn BootloaderBackend> = Arc::new(UBootEnv::from_config(&config.uboot, limits));
    registry.register(UBOOT, Some(uboot))?;

    let grub: Arc<dyn BootloaderBackend> =
        Arc::new(GrubEnv::with_limits(config.grub.envblk.clone(), limits));
    registry.register(GRUB, Some(grub))?;

    let efivars: Option<Arc<dyn BootloaderBackend>> = match &config.efivars.vendor_guid {
        None => {
            debug!("No EFI vendor GUID configured");
            None
        }
        Some(guid) => {
            let efivars =
                EfiVars::new(config.efivars.root.clone(), guid.clone()).with_limits(limits);
            if efivars.is_available() {
                Some(Arc::new(efivars))
            } else {
                debug!(root = %config.efivars.root.display(), "efivarfs not mounted");
                None
            }
        }
    };
    registry.register(EFIVARS, efivars)?;

    let file: Arc<dyn BootloaderBackend> =
        Arc::new(FileEnv::with_limits(config.file.path.clone(), limits));
    registry.register(FILE, Some(file))?;

    let none: Arc<dyn BootloaderBackend> = Arc::new(MemoryEnv::with_limits(limits));
    registry.register(NONE, Some(none))?;

    Ok(())
}
