//! Batch-assignment scripts consumed by `apply_list`
//!
//! ```text
//! # comments begin with '#'
//! NAME=VALUE      set
//! NAME            unset
//! ```
//!
//! Each line is trimmed; blank lines and comments are skipped. The name is
//! everything before the first `=`, trimmed; the value is everything after it,
//! verbatim.

use std::path::Path;

use crate::error::EnvError;

/// One parsed script line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOp {
    /// `NAME=VALUE`
    Set {
        /// Variable name
        name: String,
        /// New value (may be empty)
        value: String,
    },
    /// `NAME`
    Unset {
        /// Variable name
        name: String,
    },
}

impl ScriptOp {
    /// Variable the operation applies to
    pub fn name(&self) -> &str {
        match self {
            ScriptOp::Set { name, .. } | ScriptOp::Unset { name } => name,
        }
    }
}

/// Parse script text into operations, in file order
///
/// # Errors
///
/// Returns [`EnvError::InvalidArgument`] naming the first line with an empty
/// name or a name containing whitespace.
pub fn parse_script(text: &str) -> Result<Vec<ScriptOp>, EnvError> {
    let mut ops = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let op = match line.split_once('=') {
            Some((name, value)) => ScriptOp::Set {
                name: script_name(name, index)?,
                value: value.to_string(),
            },
            None => ScriptOp::Unset {
                name: script_name(line, index)?,
            },
        };
        ops.push(op);
    }

    Ok(ops)
}

/// Read and parse a script file
///
/// # Errors
///
/// [`EnvError::Io`] if the file cannot be read, otherwise as
/// [`parse_script`].
pub fn load_script(path: &Path) -> Result<Vec<ScriptOp>, EnvError> {
    let text = std::fs::read_to_string(path).map_err(|e| EnvError::io(path, e))?;
    parse_script(&text)
}

fn script_name(raw: &str, index: usize) -> Result<String, EnvError> {
    let name = raw.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(EnvError::InvalidArgument(format!(
            "script line {}: invalid variable name {name:?}",
            index.saturating_add(1)
        )));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn set(name: &str, value: &str) -> ScriptOp {
        ScriptOp::Set {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    fn unset(name: &str) -> ScriptOp {
        ScriptOp::Unset {
            name: name.to_string(),
        }
    }

    #[test]
    fn test_basic_script() -> TestResult {
        let ops = parse_script("FOO=1\n#c\nBAR\nBAZ=hello world")?;
        assert_eq!(ops, vec![set("FOO", "1"), unset("BAR"), set("BAZ", "hello world")]);
        Ok(())
    }

    #[test]
    fn test_whitespace_and_blank_lines() -> TestResult {
        let ops = parse_script("\n   \n  FOO =  padded\r\n\t# indented comment\n  BAR  \n")?;
        assert_eq!(ops, vec![set("FOO", "  padded"), unset("BAR")]);
        Ok(())
    }

    #[test]
    fn test_value_keeps_equals_and_quotes() -> TestResult {
        let ops = parse_script("bootargs=console=ttyS0 root=\"/dev/mmcblk0p2\"\nEMPTY=")?;
        assert_eq!(
            ops,
            vec![
                set("bootargs", "console=ttyS0 root=\"/dev/mmcblk0p2\""),
                set("EMPTY", ""),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_rejects_empty_name() {
        let err = parse_script("OK=1\n=oops\n");
        assert!(
            matches!(err, Err(EnvError::InvalidArgument(ref msg)) if msg.contains("line 2")),
            "unexpected result: {err:?}"
        );
    }

    #[test]
    fn test_rejects_space_separated_form() {
        assert!(matches!(
            parse_script("FOO BAR"),
            Err(EnvError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_op_name() {
        assert_eq!(set("A", "1").name(), "A");
        assert_eq!(unset("B").name(), "B");
    }
}
