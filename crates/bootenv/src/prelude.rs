//! Convenience re-exports for common boot-environment types

pub use crate::adapters::{
    EfiVars, FileEnv, GrubEnv, MemoryEnv, UBootEnv, register_builtin_backends,
};
pub use crate::backend::{BootloaderBackend, EnvLimits};
pub use crate::config::{BootenvConfig, DEFAULT_STATE_KEY};
pub use crate::error::{EnvError, ErrorKind};
pub use crate::registry::{
    GlobalDispatch, Registry, apply_list, env_get, env_set, env_unset, get_bootloader, global,
    is_bootloader, register_bootloader, set_bootloader,
};
pub use bootstate_uboot_format::Environment;
