//! In-memory backend
//!
//! Keeps variables for the lifetime of the process only. Used on boards
//! without a writable boot environment and as a test double.

use std::path::Path;

use bootstate_uboot_format::Environment;
use parking_lot::Mutex;

use crate::backend::{BootloaderBackend, EnvLimits};
use crate::error::EnvError;
use crate::script::{ScriptOp, load_script};

/// Volatile name/value store
#[derive(Debug, Default)]
pub struct MemoryEnv {
    vars: Mutex<Environment>,
    limits: EnvLimits,
}

impl MemoryEnv {
    /// Create an empty store with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with custom limits
    pub fn with_limits(limits: EnvLimits) -> Self {
        Self {
            vars: Mutex::new(Environment::new()),
            limits,
        }
    }
}

impl BootloaderBackend for MemoryEnv {
    fn env_get(&self, name: &str) -> Result<Option<String>, EnvError> {
        self.limits.check_name(name)?;
        Ok(self.vars.lock().get(name).map(str::to_string))
    }

    fn env_set(&self, name: &str, value: &str) -> Result<(), EnvError> {
        self.limits.check(name, value)?;
        self.vars.lock().set(name, value);
        Ok(())
    }

    fn env_unset(&self, name: &str) -> Result<(), EnvError> {
        self.limits.check_name(name)?;
        self.vars.lock().remove(name);
        Ok(())
    }

    fn apply_list(&self, script: &Path) -> Result<(), EnvError> {
        let ops = load_script(script)?;
        for op in &ops {
            match op {
                ScriptOp::Set { name, value } => self.limits.check(name, value)?,
                ScriptOp::Unset { name } => self.limits.check_name(name)?,
            }
        }

        let mut vars = self.vars.lock();
        for op in ops {
            match op {
                ScriptOp::Set { name, value } => {
                    vars.set(&name, &value);
                }
                ScriptOp::Unset { name } => {
                    vars.remove(&name);
                }
            }
        }
        Ok(())
    }
}
