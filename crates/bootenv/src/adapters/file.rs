//! JSON file backend
//!
//! For boards whose bootloader reads its variables from a plain file (or
//! for development hosts). The file holds one JSON object of string values
//! and is replaced atomically on every change.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::atomic::write_atomic;
use crate::backend::{BootloaderBackend, EnvLimits};
use crate::error::EnvError;
use crate::script::{ScriptOp, load_script};

type Vars = IndexMap<String, String>;

/// Variables persisted as a JSON object
#[derive(Debug)]
pub struct FileEnv {
    path: PathBuf,
    limits: EnvLimits,
    write_lock: Mutex<()>,
}

impl FileEnv {
    /// Backend over the JSON document at `path`; a missing file is empty
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_limits(path, EnvLimits::default())
    }

    /// Backend with custom name/value limits
    pub fn with_limits(path: impl Into<PathBuf>, limits: EnvLimits) -> Self {
        Self {
            path: path.into(),
            limits,
            write_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Vars, EnvError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vars::new()),
            Err(e) => return Err(EnvError::io(&self.path, e)),
        };
        serde_json::from_str(&text).map_err(|e| {
            EnvError::Corrupt(format!("{}: {e}", self.path.display()))
        })
    }

    fn mutate(&self, op: impl FnOnce(&mut Vars) -> bool) -> Result<(), EnvError> {
        let _guard = self.write_lock.lock();
        let mut vars = self.load()?;
        if !op(&mut vars) {
            return Ok(());
        }

        let json = serde_json::to_vec_pretty(&vars)
            .map_err(|e| EnvError::Corrupt(format!("serializing variables: {e}")))?;
        write_atomic(&self.path, &json, ".tmp")?;
        debug!(path = %self.path.display(), vars = vars.len(), "Wrote environment file");
        Ok(())
    }
}

fn set(vars: &mut Vars, name: &str, value: &str) -> bool {
    if vars.get(name).is_some_and(|old| old == value) {
        return false;
    }
    vars.insert(name.to_string(), value.to_string());
    true
}

impl BootloaderBackend for FileEnv {
    fn env_get(&self, name: &str) -> Result<Option<String>, EnvError> {
        self.limits.check_name(name)?;
        Ok(self.load()?.shift_remove(name))
    }

    fn env_set(&self, name: &str, value: &str) -> Result<(), EnvError> {
        self.limits.check(name, value)?;
        self.mutate(|vars| set(vars, name, value))
    }

    fn env_unset(&self, name: &str) -> Result<(), EnvError> {
        self.limits.check_name(name)?;
        self.mutate(|vars| vars.shift_remove(name).is_some())
    }

    fn apply_list(&self, script: &Path) -> Result<(), EnvError> {
        let ops = load_script(script)?;
        for op in &ops {
            match op {
                ScriptOp::Set { name, value } => self.limits.check(name, value)?,
                ScriptOp::Unset { name } => self.limits.check_name(name)?,
            }
        }
        self.mutate(|vars| {
            ops.iter().fold(false, |changed, op| {
                let applied = match op {
                    ScriptOp::Set { name, value } => set(vars, name, value),
                    ScriptOp::Unset { name } => vars.shift_remove(name).is_some(),
                };
                changed | applied
            })
        })
    }
}
