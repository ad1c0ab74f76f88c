//! GRUB environment block backend
//!
//! `grubenv` is a fixed 1024-byte file:
//!
//! ```text
//! # GRUB Environment Block\n
//! name=value\n
//! ...
//! ##################...
//! ```
//!
//! Backslash and newline inside names and values are escaped with a
//! backslash. Updates go to `grubenv.new`, which is then renamed over the
//! block, the same way `grub-editenv` does it.

use std::path::{Path, PathBuf};

use bootstate_uboot_format::Environment;
use parking_lot::Mutex;
use tracing::debug;

use crate::atomic::write_atomic;
use crate::backend::{BootloaderBackend, EnvLimits};
use crate::error::EnvError;
use crate::script::{ScriptOp, load_script};

/// Size of the environment block
pub const GRUBENV_SIZE: usize = 1024;

/// First line of every environment block
pub const GRUBENV_HEADER: &str = "# GRUB Environment Block\n";

/// `grubenv` file backend
#[derive(Debug)]
pub struct GrubEnv {
    path: PathBuf,
    limits: EnvLimits,
    write_lock: Mutex<()>,
}

impl GrubEnv {
    /// Backend over the block at `path`
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

    /// Path of the environment block
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write an empty block, replacing any existing one
    ///
    /// # Errors
    ///
    /// [`EnvError::Io`] if the block cannot be written.
    pub fn create(&self) -> Result<(), EnvError> {
        let _guard = self.write_lock.lock();
        self.store(&Environment::new())
    }

    /// Read all variables
    ///
    /// # Errors
    ///
    /// [`EnvError::Io`] if the block cannot be read, [`EnvError::Corrupt`] if
    /// it has the wrong size or header.
    pub fn environment(&self) -> Result<Environment, EnvError> {
        let raw = std::fs::read(&self.path).map_err(|e| EnvError::io(&self.path, e))?;
        decode_block(&raw)
    }

    fn store(&self, env: &Environment) -> Result<(), EnvError> {
        let block = encode_block(env)?;
        write_atomic(&self.path, &block, ".new")?;
        debug!(path = %self.path.display(), vars = env.len(), "Wrote GRUB environment block");
        Ok(())
    }

    fn mutate(&self, op: impl FnOnce(&mut Environment) -> bool) -> Result<(), EnvError> {
        let _guard = self.write_lock.lock();
        let mut env = self.environment()?;
        if !op(&mut env) {
            return Ok(());
        }
        self.store(&env)
    }

    fn check_name(&self, name: &str) -> Result<(), EnvError> {
        self.limits.check_name(name)?;
        if name.starts_with('#') || name.contains('\n') {
            return Err(EnvError::InvalidArgument(format!(
                "{name:?} is not a valid GRUB variable name"
            )));
        }
        Ok(())
    }

    fn check_op(&self, op: &ScriptOp) -> Result<(), EnvError> {
        self.check_name(op.name())?;
        match op {
            ScriptOp::Set { value, .. } => self.limits.check_value(value),
            ScriptOp::Unset { .. } => Ok(()),
        }
    }
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        if matches!(c, '\\' | '\n') {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Serialize into a full block padded with `#`
///
/// # Errors
///
/// [`EnvError::OutOfSpace`] if the variables do not fit.
pub fn encode_block(env: &Environment) -> Result<Vec<u8>, EnvError> {
    let mut text = String::from(GRUBENV_HEADER);
    for (name, value) in env.iter() {
        escape_into(&mut text, name);
        text.push('=');
        escape_into(&mut text, value);
        text.push('\n');
    }

    if text.len() > GRUBENV_SIZE {
        return Err(EnvError::OutOfSpace {
            needed: text.len(),
            available: GRUBENV_SIZE,
        });
    }
    let mut block = text.into_bytes();
    block.resize(GRUBENV_SIZE, b'#');
    Ok(block)
}

/// Parse a full block
///
/// Lines starting with `#` (including the padding) and lines without `=`
/// are skipped.
///
/// # Errors
///
/// [`EnvError::Corrupt`] on a wrong size, a missing header or invalid UTF-8.
pub fn decode_block(raw: &[u8]) -> Result<Environment, EnvError> {
    if raw.len() != GRUBENV_SIZE {
        return Err(EnvError::Corrupt(format!(
            "GRUB environment block is {} bytes, expected {GRUBENV_SIZE}",
            raw.len()
        )));
    }
    let body = raw
        .strip_prefix(GRUBENV_HEADER.as_bytes())
        .ok_or_else(|| EnvError::Corrupt("GRUB environment header missing".to_string()))?;
    let body = std::str::from_utf8(body)
        .map_err(|e| EnvError::Corrupt(format!("GRUB environment is not valid UTF-8: {e}")))?;

    let mut env = Environment::new();
    let mut chars = body.chars().peekable();
    while let Some(&first) = chars.peek() {
        let mut line = String::new();
        let mut escaped = false;
        for c in chars.by_ref() {
            if escaped {
                line.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '\n' {
                break;
            } else {
                line.push(c);
            }
        }

        if first == '#' {
            continue;
        }
        if let Some((name, value)) = line.split_once('=')
            && !name.is_empty()
        {
            env.set(name, value);
        }
    }
    Ok(env)
}

impl BootloaderBackend for GrubEnv {
    fn env_get(&self, name: &str) -> Result<Option<String>, EnvError> {
        self.check_name(name)?;
        Ok(self.environment()?.get(name).map(str::to_string))
    }

    fn env_set(&self, name: &str, value: &str) -> Result<(), EnvError> {
        self.check_name(name)?;
        self.limits.check_value(value)?;
        self.mutate(|env| env.set(name, value))
    }

    fn env_unset(&self, name: &str) -> Result<(), EnvError> {
        self.check_name(name)?;
        self.mutate(|env| env.remove(name))
    }

    fn apply_list(&self, script: &Path) -> Result<(), EnvError> {
        let ops = load_script(script)?;
        for op in &ops {
            self.check_op(op)?;
        }
        self.mutate(|env| {
            ops.iter().fold(false, |changed, op| {
                let applied = match op {
                    ScriptOp::Set { name, value } => env.set(name, value),
                    ScriptOp::Unset { name } => env.remove(name),
                };
                changed | applied
            })
        })
    }
}
