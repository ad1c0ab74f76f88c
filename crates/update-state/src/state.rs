//! Update states and their on-media encoding
//!
//! Each state is stored as one ASCII digit. The boot code reads the same
//! byte, so the mapping below must never change:
//!
//! | state           | byte  |
//! |-----------------|-------|
//! | `Ok`            | `'0'` |
//! | `Installed`     | `'1'` |
//! | `Testing`       | `'2'` |
//! | `Failed`        | `'3'` |
//! | `NotAvailable`  | `'4'` |
//! | `Error`         | `'5'` |
//! | `Wait`          | `'6'` |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Progress of an update as seen by the agent and the boot code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum UpdateState {
    /// No update in progress; the last one (if any) was finalized
    Ok = b'0',
    /// New firmware written to the inactive slot, reboot pending
    Installed = b'1',
    /// Booted into the new firmware, awaiting confirmation
    Testing = b'2',
    /// Update or post-boot test failed
    Failed = b'3',
    /// Nothing stored under the key; never written
    NotAvailable = b'4',
    /// Stored value is not a known state; never written
    Error = b'5',
    /// Update deferred
    Wait = b'6',
}

/// Every state, in encoding order
pub const ALL_STATES: [UpdateState; 7] = [
    UpdateState::Ok,
    UpdateState::Installed,
    UpdateState::Testing,
    UpdateState::Failed,
    UpdateState::NotAvailable,
    UpdateState::Error,
    UpdateState::Wait,
];

impl UpdateState {
    /// The stored byte
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Decode a stored byte
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'0' => Some(Self::Ok),
            b'1' => Some(Self::Installed),
            b'2' => Some(Self::Testing),
            b'3' => Some(Self::Failed),
            b'4' => Some(Self::NotAvailable),
            b'5' => Some(Self::Error),
            b'6' => Some(Self::Wait),
            _ => None,
        }
    }

    /// Decode a stored value by its first byte
    ///
    /// An empty value or an unknown first byte decodes to [`UpdateState::Error`].
    pub fn from_stored(value: &str) -> Self {
        value
            .as_bytes()
            .first()
            .and_then(|&byte| Self::from_byte(byte))
            .unwrap_or(Self::Error)
    }

    /// Single-character value as written to the environment
    pub fn encode(self) -> String {
        char::from(self.as_byte()).to_string()
    }

    /// Human-readable name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Installed => "installed",
            Self::Testing => "testing",
            Self::Failed => "failed",
            Self::NotAvailable => "not_available",
            Self::Error => "error",
            Self::Wait => "wait",
        }
    }

    /// Whether the state may be persisted
    ///
    /// `NotAvailable` and `Error` only describe what a read found.
    pub const fn is_writable(self) -> bool {
        !matches!(self, Self::NotAvailable | Self::Error)
    }

    /// Whether callers may move from `from` to `to`
    ///
    /// The manager only enforces [`is_writable`](Self::is_writable); this is
    /// the contract update workflows follow on top of it. Rewriting the
    /// current state is always allowed.
    pub const fn can_transition(from: Self, to: Self) -> bool {
        if !to.is_writable() {
            return false;
        }
        if from as u8 == to as u8 {
            return true;
        }
        matches!(
            (from, to),
            (_, Self::Failed)
                | (Self::Ok, Self::Installed)
                | (Self::Installed, Self::Testing)
                | (Self::Testing, Self::Ok)
                | (Self::Failed, Self::Ok)
                | (Self::Ok, Self::Wait)
                | (Self::Wait, Self::Ok)
        )
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<UpdateState> for u8 {
    fn from(state: UpdateState) -> Self {
        state.as_byte()
    }
}

/// Byte that is not a state code
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid state byte {0:#04x}")]
pub struct InvalidStateByte(pub u8);

impl TryFrom<u8> for UpdateState {
    type Error = InvalidStateByte;

    fn try_from(byte: u8) -> Result<Self, InvalidStateByte> {
        Self::from_byte(byte).ok_or(InvalidStateByte(byte))
    }
}

/// Name that is not a state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown update state {0:?}")]
pub struct UnknownState(pub String);

impl FromStr for UpdateState {
    type Err = UnknownState;

    /// Accepts the names from [`as_str`](Self::as_str) (any case) and the
    /// stored digits
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let [byte] = s.as_bytes()
            && let Some(state) = Self::from_byte(*byte)
        {
            return Ok(state);
        }
        ALL_STATES
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_wire_bytes() {
        let bytes: Vec<u8> = ALL_STATES.iter().map(|s| s.as_byte()).collect();
        assert_eq!(bytes, b"0123456");
        assert_eq!(UpdateState::Installed.encode(), "1");
    }

    #[test]
    fn test_from_stored() {
        assert_eq!(UpdateState::from_stored("2"), UpdateState::Testing);
        assert_eq!(UpdateState::from_stored("6trailing"), UpdateState::Wait);
        assert_eq!(UpdateState::from_stored("X"), UpdateState::Error);
        assert_eq!(UpdateState::from_stored(""), UpdateState::Error);
        assert_eq!(UpdateState::from_stored("7"), UpdateState::Error);
    }

    #[test]
    fn test_parse_names_and_digits() -> TestResult {
        assert_eq!("testing".parse::<UpdateState>()?, UpdateState::Testing);
        assert_eq!("NOT_AVAILABLE".parse::<UpdateState>()?, UpdateState::NotAvailable);
        assert_eq!("3".parse::<UpdateState>()?, UpdateState::Failed);
        assert!(matches!("rebooting".parse::<UpdateState>(), Err(UnknownState(_))));
        Ok(())
    }

    #[test]
    fn test_try_from() {
        assert_eq!(UpdateState::try_from(b'0'), Ok(UpdateState::Ok));
        assert_eq!(UpdateState::try_from(0xff), Err(InvalidStateByte(0xff)));
    }

    #[test]
    fn test_serde_names() -> TestResult {
        assert_eq!(serde_json::to_string(&UpdateState::NotAvailable)?, "\"not_available\"");
        let state: UpdateState = serde_json::from_str("\"wait\"")?;
        assert_eq!(state, UpdateState::Wait);
        Ok(())
    }

    #[test]
    fn test_transitions() {
        use UpdateState::*;
        assert!(UpdateState::can_transition(Ok, Installed));
        assert!(UpdateState::can_transition(Installed, Testing));
        assert!(UpdateState::can_transition(Testing, Ok));
        assert!(UpdateState::can_transition(Testing, Failed));
        assert!(UpdateState::can_transition(Wait, Failed));
        assert!(UpdateState::can_transition(Failed, Ok));
        assert!(UpdateState::can_transition(Ok, Wait));
        assert!(UpdateState::can_transition(Wait, Ok));
        assert!(UpdateState::can_transition(Testing, Testing));

        assert!(!UpdateState::can_transition(Ok, Testing));
        assert!(!UpdateState::can_transition(Installed, Ok));
        assert!(!UpdateState::can_transition(Failed, Installed));
        assert!(!UpdateState::can_transition(Ok, NotAvailable));
        assert!(!UpdateState::can_transition(Error, Error));
    }
}
