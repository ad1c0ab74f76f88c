//! Ordered name/value map backing one environment copy

use std::borrow::Cow;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::FormatError;

/// Environment variables in first-seen order
///
/// Order is preserved across parse/encode so that rewriting a copy after a
/// single change produces the smallest possible diff on the medium. Names and
/// values are kept as raw bytes: U-Boot does not require UTF-8, and entries
/// written by other tools must survive a rewrite unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: IndexMap<Vec<u8>, Vec<u8>>,
}

impl Environment {
    /// Create an empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a variable holding text
    ///
    /// `None` if the variable is missing or its value is not UTF-8; see
    /// [`get_bytes`](Self::get_bytes) and [`get_lossy`](Self::get_lossy).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_bytes(name)
            .and_then(|value| std::str::from_utf8(value).ok())
    }

    /// Look up a variable as stored
    pub fn get_bytes(&self, name: &str) -> Option<&[u8]> {
        self.vars.get(name.as_bytes()).map(Vec::as_slice)
    }

    /// Look up a variable, replacing invalid UTF-8 with U+FFFD
    pub fn get_lossy(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get_bytes(name).map(String::from_utf8_lossy)
    }

    /// Set a variable, keeping its position if it already exists
    ///
    /// Returns `true` if the environment changed.
    pub fn set(&mut self, name: &str, value: &str) -> bool {
        self.set_bytes(name.as_bytes(), value.as_bytes())
    }

    /// Set a variable from raw bytes
    ///
    /// Returns `true` if the environment changed.
    pub fn set_bytes(&mut self, name: &[u8], value: &[u8]) -> bool {
        match self.vars.get_mut(name) {
            Some(existing) if existing.as_slice() == value => false,
            Some(existing) => {
                value.clone_into(existing);
                true
            }
            None => {
                self.vars.insert(name.to_vec(), value.to_vec());
                true
            }
        }
    }

    /// Remove a variable, keeping the order of the others
    ///
    /// Returns `true` if the variable existed.
    pub fn remove(&mut self, name: &str) -> bool {
        self.vars.shift_remove(name.as_bytes()).is_some()
    }

    /// Iterate over the text `(name, value)` pairs in order
    ///
    /// Entries whose name or value is not UTF-8 are left out; they are still
    /// encoded. Use [`iter_bytes`](Self::iter_bytes) to see every entry.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter_bytes().filter_map(|(k, v)| {
            Some((std::str::from_utf8(k).ok()?, std::str::from_utf8(v).ok()?))
        })
    }

    /// Iterate over every `(name, value)` pair in order, as stored
    pub fn iter_bytes(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.vars.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the environment holds no variables
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Bytes needed to serialize the environment, terminator included
    pub fn encoded_len(&self) -> usize {
        self.vars
            .iter()
            .map(|(k, v)| k.len().saturating_add(v.len()).saturating_add(2))
            .fold(1usize, usize::saturating_add)
    }

    /// Serialize into a data region of exactly `data_size` bytes
    ///
    /// Unused trailing bytes are filled with `0xff`.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::OutOfSpace`] if the variables do not fit.
    pub fn encode(&self, data_size: usize) -> Result<Vec<u8>, FormatError> {
        let needed = self.encoded_len();
        if needed > data_size {
            return Err(FormatError::OutOfSpace {
                needed,
                available: data_size,
            });
        }

        let mut data = Vec::with_capacity(data_size);
        for (name, value) in &self.vars {
            data.extend_from_slice(name);
            data.push(b'=');
            data.extend_from_slice(value);
            data.push(0);
        }
        data.push(0);
        data.resize(data_size, 0xff);
        Ok(data)
    }

    /// Parse a data region (`NAME=VALUE\0 ... \0`)
    ///
    /// Entries without `=` or with an empty name are skipped, as U-Boot
    /// does when importing its environment. Bytes are kept as they are.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::Corrupt`] if the end marker is missing.
    pub fn decode(data: &[u8]) -> Result<Self, FormatError> {
        let mut env = Self::new();
        let mut rest = data;

        loop {
            let Some(nul) = rest.iter().position(|&b| b == 0) else {
                return Err(FormatError::Corrupt(
                    "environment is not terminated".to_string(),
                ));
            };
            let (entry, tail) = rest.split_at(nul);
            if entry.is_empty() {
                return Ok(env);
            }

            match entry.iter().position(|&b| b == b'=') {
                Some(0) | None => {
                    debug!(
                        entry = %String::from_utf8_lossy(entry),
                        "Skipping environment entry without a name"
                    );
                }
                Some(eq) => {
                    let (name, value) = entry.split_at(eq);
                    env.set_bytes(name, value.get(1..).unwrap_or_default());
                }
            }

            rest = tail.get(1..).unwrap_or_default();
        }
    }

    /// Load a plain-text default environment (`NAME=VALUE` per line)
    ///
    /// Blank lines and `#` comments are skipped; lines without `=` are
    /// ignored.
    pub fn from_text(text: &str) -> Self {
        let mut env = Self::new();
        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            if let Some((name, value)) = line.split_once('=') {
                let name = name.trim();
                if !name.is_empty() {
                    env.set(name, value);
                }
            }
        }
        env
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Environment {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut env = Self::new();
        for (name, value) in iter {
            env.set(name, value);
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_encode_layout() -> TestResult {
        let env: Environment = [("bootcmd", "run x"), ("ustate", "1")].into_iter().collect();
        let data = env.encode(32)?;
        assert_eq!(data.len(), 32);
        assert!(data.starts_with(b"bootcmd=run x\0ustate=1\0\0"));
        assert!(data.iter().skip(24).all(|&b| b == 0xff));
        Ok(())
    }

    #[test]
    fn test_empty_environment_encodes_terminator_only() -> TestResult {
        let data = Environment::new().encode(4)?;
        assert_eq!(data, vec![0, 0xff, 0xff, 0xff]);
        assert_eq!(Environment::decode(&data)?, Environment::new());
        Ok(())
    }

    #[test]
    fn test_exact_capacity() -> TestResult {
        let env: Environment = [("a", "12345")].into_iter().collect();
        // "a=12345\0" + "\0"
        assert_eq!(env.encoded_len(), 9);
        assert!(matches!(env.encode(9), Ok(_)));
        assert_eq!(
            env.encode(8),
            Err(FormatError::OutOfSpace {
                needed: 9,
                available: 8
            })
        );
        Ok(())
    }

    #[test]
    fn test_set_preserves_order() {
        let mut env: Environment = [("a", "1"), ("b", "2"), ("c", "3")].into_iter().collect();
        assert!(env.set("a", "10"));
        assert!(!env.set("a", "10"));
        assert!(env.remove("b"));
        assert!(!env.remove("b"));
        env.set("d", "4");
        let names: Vec<&str> = env.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["a", "c", "d"]);
    }

    #[test]
    fn test_decode_value_with_equals() -> TestResult {
        let env = Environment::decode(b"args=a=b c=d\0\0")?;
        assert_eq!(env.get("args"), Some("a=b c=d"));
        Ok(())
    }

    #[test]
    fn test_decode_skips_entries_without_name() -> TestResult {
        let env = Environment::decode(b"bootcmd=run x\0junk\0=value\0ustate=1\0\0")?;
        let vars: Vec<(&str, &str)> = env.iter().collect();
        assert_eq!(vars, [("bootcmd", "run x"), ("ustate", "1")]);
        Ok(())
    }

    #[test]
    fn test_decode_keeps_non_utf8_bytes() -> TestResult {
        let data = b"label=caf\xe9\0ustate=1\0\0";
        let env = Environment::decode(data)?;
        assert_eq!(env.len(), 2);
        assert_eq!(env.get("label"), None);
        assert_eq!(env.get_bytes("label"), Some(&b"caf\xe9"[..]));
        assert_eq!(env.get_lossy("label").as_deref(), Some("caf\u{fffd}"));
        assert_eq!(env.get("ustate"), Some("1"));

        let encoded = env.encode(data.len())?;
        assert_eq!(encoded.as_slice(), &data[..]);
        Ok(())
    }

    #[test]
    fn test_decode_requires_terminator() {
        assert!(matches!(
            Environment::decode(b"a=1\0b=2"),
            Err(FormatError::Corrupt(_))
        ));
        assert!(matches!(
            Environment::decode(&[0xffu8; 16]),
            Err(FormatError::Corrupt(_))
        ));
    }

    #[test]
    fn test_from_text() {
        let env = Environment::from_text("# defaults\nbootdelay=3\n\nbootcmd=run a; run b\r\njunk\n");
        assert_eq!(env.len(), 2);
        assert_eq!(env.get("bootdelay"), Some("3"));
        assert_eq!(env.get("bootcmd"), Some("run a; run b"));
    }
}
