//! U-Boot environment backend
//!
//! Reads and writes the environment the way `fw_printenv`/`fw_setenv` do:
//! the copies are described by `fw_env.config`, each copy is a CRC32-protected
//! record, and with two copies every write goes to the stale one and carries
//! the next flags counter. A crash during the write therefore leaves the
//! previous copy intact and selected.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use bootstate_uboot_format::{
    CopyId, EnvCopy, Environment, FwEnvConfig, Layout, Selection, decode_copy, encode_copy,
    select_copy,
};
use tracing::{debug, warn};

use super::medium::{read_copy, write_copy};
use crate::backend::{BootloaderBackend, EnvLimits};
use crate::config::UBootConfig;
use crate::error::EnvError;
use crate::lock::EnvLock;
use crate::script::{ScriptOp, load_script};

#[derive(Debug, Clone)]
enum ConfigSource {
    File(PathBuf),
    Inline(FwEnvConfig),
}

/// U-Boot environment on flash, block device or image file
#[derive(Debug, Clone)]
pub struct UBootEnv {
    source: ConfigSource,
    default_env: Option<PathBuf>,
    lock_file: Option<PathBuf>,
    limits: EnvLimits,
}

/// State of the medium as found by the last read
#[derive(Debug)]
struct Snapshot {
    /// Variables in use; the default environment if no copy is valid
    env: Environment,
    /// Flags counter of the copy in use
    flags: u8,
    /// Copy the next write goes to
    target: CopyId,
    /// The medium needs rewriting even if the variables are unchanged
    repair: bool,
}

impl UBootEnv {
    /// Backend over an already parsed device description
    ///
    /// No default environment and no lock file are used.
    pub fn new(fw_config: FwEnvConfig) -> Self {
        Self {
            source: ConfigSource::Inline(fw_config),
            default_env: None,
            lock_file: None,
            limits: EnvLimits::default(),
        }
    }

    /// Backend reading its device description from `fw_env.config` on every
    /// operation
    pub fn from_config(config: &UBootConfig, limits: EnvLimits) -> Self {
        Self {
            source: ConfigSource::File(config.fw_env_config.clone()),
            default_env: config.default_env.clone(),
            lock_file: config.lock_file.clone(),
            limits,
        }
    }

    /// Use `path` (`NAME=VALUE` lines) when no stored copy is valid
    pub fn with_default_env(mut self, path: Option<PathBuf>) -> Self {
        self.default_env = path;
        self
    }

    /// Hold an exclusive lock on `path` during every operation
    pub fn with_lock_file(mut self, path: Option<PathBuf>) -> Self {
        self.lock_file = path;
        self
    }

    /// Override the name/value limits
    pub fn with_limits(mut self, limits: EnvLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Read the complete current environment
    ///
    /// Without a valid copy this is the default environment, or an empty one
    /// if none is configured.
    ///
    /// # Errors
    ///
    /// Configuration and I/O errors.
    pub fn environment(&self) -> Result<Environment, EnvError> {
        let config = self.fw_config()?;
        let _lock = self.lock()?;
        Ok(self.load(&config)?.env)
    }

    fn fw_config(&self) -> Result<FwEnvConfig, EnvError> {
        match &self.source {
            ConfigSource::Inline(config) => Ok(config.clone()),
            ConfigSource::File(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| EnvError::io(path, e))?;
                Ok(FwEnvConfig::parse(&text)?)
            }
        }
    }

    fn lock(&self) -> Result<Option<EnvLock>, EnvError> {
        self.lock_file.as_deref().map(EnvLock::acquire).transpose()
    }

    fn load(&self, config: &FwEnvConfig) -> Result<Snapshot, EnvError> {
        let layout = config.layout();
        let mut copies: [Option<EnvCopy>; 2] = [None, None];
        for (slot, dev) in copies.iter_mut().zip(config.devices()) {
            let raw = read_copy(dev)?;
            match decode_copy(layout, &raw) {
                Ok(copy) => *slot = Some(copy),
                Err(e) => {
                    debug!(device = %dev.path.display(), offset = dev.offset, error = %e, "Environment copy invalid");
                }
            }
        }
        let [a, b] = copies;

        if layout == Layout::Single {
            return match a {
                Some(copy) => Ok(Snapshot {
                    env: copy.env,
                    flags: 0,
                    target: CopyId::A,
                    repair: false,
                }),
                None => {
                    warn!("Environment CRC check failed, falling back to default environment");
                    Ok(Snapshot {
                        env: self.default_environment()?,
                        flags: 0,
                        target: CopyId::A,
                        repair: true,
                    })
                }
            };
        }

        let selection = select_copy(
            a.as_ref().and_then(|c| c.flags),
            b.as_ref().and_then(|c| c.flags),
        );
        match selection {
            Selection::Newer(id) => debug!(copy = %id, "Using newer environment copy"),
            Selection::Tie => warn!(
                flags = a.as_ref().and_then(|c| c.flags).unwrap_or_default(),
                "Both environment copies carry the same flags, using copy A"
            ),
            Selection::Repair { valid } => warn!(
                valid = %valid,
                corrupt = %valid.other(),
                "Environment copy corrupt, auto-repair on next write"
            ),
            Selection::NoneValid => {
                warn!("No valid environment copy, falling back to default environment");
            }
        }

        let active = match selection.active() {
            Some(CopyId::A) => a,
            Some(CopyId::B) => b,
            None => None,
        };
        let (env, flags) = match active {
            Some(copy) => (copy.env, copy.flags.unwrap_or_default()),
            None => (self.default_environment()?, 0),
        };

        Ok(Snapshot {
            env,
            flags,
            target: selection.write_target(),
            repair: !matches!(selection, Selection::Newer(_)),
        })
    }

    fn default_environment(&self) -> Result<Environment, EnvError> {
        let Some(path) = self.default_env.as_deref() else {
            debug!("No default environment configured, starting empty");
            return Ok(Environment::new());
        };
        match std::fs::read_to_string(path) {
            Ok(text) => {
                debug!(path = %path.display(), "Loaded default environment");
                Ok(Environment::from_text(&text))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Default environment missing, starting empty");
                Ok(Environment::new())
            }
            Err(e) => Err(EnvError::io(path, e)),
        }
    }

    fn store(
        &self,
        config: &FwEnvConfig,
        snapshot: &Snapshot,
        env: &Environment,
    ) -> Result<(), EnvError> {
        let layout = config.layout();
        let flags = snapshot.flags.wrapping_add(1);
        let raw = encode_copy(layout, config.env_size(), flags, env)?;
        let dev = config
            .devices()
            .get(snapshot.target.index())
            .ok_or_else(|| EnvError::Config(format!("copy {} not configured", snapshot.target)))?;

        write_copy(dev, &raw, layout == Layout::Single)?;
        debug!(
            copy = %snapshot.target,
            device = %dev.path.display(),
            flags,
            vars = env.len(),
            "Wrote environment"
        );
        Ok(())
    }

    /// Load, apply `op`, and write back if anything changed or the medium
    /// needs repair
    fn mutate(&self, op: impl FnOnce(&mut Environment) -> bool) -> Result<(), EnvError> {
        let config = self.fw_config()?;
        let _lock = self.lock()?;
        let snapshot = self.load(&config)?;

        let mut env = snapshot.env.clone();
        let changed = op(&mut env);
        if !changed && !snapshot.repair {
            debug!("Environment unchanged, nothing written");
            return Ok(());
        }
        self.store(&config, &snapshot, &env)
    }

    fn check_op(&self, op: &ScriptOp) -> Result<(), EnvError> {
        match op {
            ScriptOp::Set { name, value } => self.limits.check(name, value),
            ScriptOp::Unset { name } => self.limits.check_name(name),
        }
    }
}

/// Apply one assignment with U-Boot semantics (empty value deletes)
fn assign(env: &mut Environment, name: &str, value: &str) -> bool {
    if value.is_empty() {
        env.remove(name)
    } else {
        env.set(name, value)
    }
}

impl BootloaderBackend for UBootEnv {
    fn env_get(&self, name: &str) -> Result<Option<String>, EnvError> {
        self.limits.check_name(name)?;
        let env = self.environment()?;
        Ok(env.get_lossy(name).map(Cow::into_owned))
    }

    fn env_set(&self, name: &str, value: &str) -> Result<(), EnvError> {
        self.limits.check(name, value)?;
        self.mutate(|env| assign(env, name, value))
    }

    fn env_unset(&self, name: &str) -> Result<(), EnvError> {
        self.limits.check_name(name)?;
        self.mutate(|env| env.remove(name))
    }

    fn apply_list(&self, script: &Path) -> Result<(), EnvError> {
        let ops = load_script(script)?;
        for op in &ops {
            self.check_op(op)?;
        }
        debug!(script = %script.display(), ops = ops.len(), "Applying environment script");

        self.mutate(|env| {
            ops.iter().fold(false, |changed, op| {
                let applied = match op {
                    ScriptOp::Set { name, value } => assign(env, name, value),
                    ScriptOp::Unset { name } => env.remove(name),
                };
                changed | applied
            })
        })
    }
}
