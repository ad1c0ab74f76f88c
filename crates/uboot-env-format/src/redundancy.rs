//! Redundant-copy selection
//!
//! Each copy of a redundant environment carries a one-byte counter that is
//! incremented (mod 256) on every write. The copy with the newer counter and a
//! valid CRC is the current one; the other is stale and is the target of the
//! next write.

/// Identifies one of the two copies of a redundant environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyId {
    /// First configured copy
    A,
    /// Second configured copy
    B,
}

impl CopyId {
    /// Get the other copy
    pub fn other(self) -> Self {
        match self {
            CopyId::A => CopyId::B,
            CopyId::B => CopyId::A,
        }
    }

    /// Position in the configured device list
    pub fn index(self) -> usize {
        match self {
            CopyId::A => 0,
            CopyId::B => 1,
        }
    }
}

impl std::fmt::Display for CopyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CopyId::A => write!(f, "A"),
            CopyId::B => write!(f, "B"),
        }
    }
}

/// Outcome of comparing the two copies of a redundant environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Both copies valid with distinct counters; the named one is newer
    Newer(CopyId),
    /// Both copies valid with equal counters; copy A is used
    Tie,
    /// Only the named copy is valid; the other will be rewritten
    Repair {
        /// The copy that passed CRC validation
        valid: CopyId,
    },
    /// Neither copy is valid
    NoneValid,
}

impl Selection {
    /// Copy whose contents are current, if any
    pub fn active(self) -> Option<CopyId> {
        match self {
            Selection::Newer(id) => Some(id),
            Selection::Tie => Some(CopyId::A),
            Selection::Repair { valid } => Some(valid),
            Selection::NoneValid => None,
        }
    }

    /// Copy the next write must go to
    pub fn write_target(self) -> CopyId {
        self.active().map_or(CopyId::A, CopyId::other)
    }
}

/// Whether counter `a` is newer than counter `b` under modulo-256 arithmetic
///
/// Equal counters are never newer than each other.
pub fn is_newer(a: u8, b: u8) -> bool {
    a != b && a.wrapping_sub(b) < 0x80
}

/// Pick the current copy from the counters of the CRC-valid copies
///
/// `None` means the copy failed validation.
pub fn select_copy(a: Option<u8>, b: Option<u8>) -> Selection {
    match (a, b) {
        (Some(fa), Some(fb)) if fa == fb => Selection::Tie,
        (Some(fa), Some(fb)) if is_newer(fb, fa) => Selection::Newer(CopyId::B),
        (Some(_), Some(_)) => Selection::Newer(CopyId::A),
        (Some(_), None) => Selection::Repair { valid: CopyId::A },
        (None, Some(_)) => Selection::Repair { valid: CopyId::B },
        (None, None) => Selection::NoneValid,
    }
}
