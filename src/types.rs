//! RANGEINGEST - Core Type Definitions
//! Defines the key, timestamp and span types shared by the table reader,
//! the statistics engine and the command evaluator.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw key bytes. Using Vec<u8> allows arbitrary binary keys.
pub type Key = Vec<u8>;

/// Raw value bytes. An empty value is a deletion tombstone.
pub type Value = Vec<u8>;

/// Number of bytes a non-zero timestamp adds to an encoded versioned key.
pub const TIMESTAMP_ENCODED_LEN: usize = 12;

/// Hybrid timestamp: wall clock nanoseconds plus a logical counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub wall_time: i64,
    pub logical: i32,
}

impl Timestamp {
    /// The unset timestamp. Marks an unversioned key.
    pub const ZERO: Timestamp = Timestamp {
        wall_time: 0,
        logical: 0,
    };

    pub fn new(wall_time: i64, logical: i32) -> Self {
        Self { wall_time, logical }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.wall_time, self.logical)
    }
}

/// A user key at a specific version.
///
/// Ordered by key bytes ascending, then by timestamp descending so that the
/// most recent version of a key comes first. The zero timestamp sorts ahead
/// of every version, which makes `VersionedKey::new(k, Timestamp::ZERO)` the
/// seek target for "the first entry of `k`".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionedKey {
    pub key: Key,
    pub timestamp: Timestamp,
}

impl VersionedKey {
    pub fn new(key: impl Into<Key>, timestamp: Timestamp) -> Self {
        Self {
            key: key.into(),
            timestamp,
        }
    }

    /// The position before every version of `key`.
    pub fn first_of(key: &[u8]) -> Self {
        Self::new(key.to_vec(), Timestamp::ZERO)
    }

    /// The smallest possible versioned key.
    pub fn min() -> Self {
        Self::first_of(&[])
    }

    /// Size of the key as accounted for in range statistics.
    pub fn encoded_len(&self) -> usize {
        let ts_len = if self.timestamp.is_zero() {
            0
        } else {
            TIMESTAMP_ENCODED_LEN
        };
        self.key.len() + 1 + ts_len
    }

    /// True when `self` sorts strictly before `other`.
    pub fn less(&self, other: &VersionedKey) -> bool {
        self < other
    }
}

impl Ord for VersionedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key).then_with(|| {
            match (self.timestamp.is_zero(), other.timestamp.is_zero()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                // Newer versions first.
                (false, false) => other.timestamp.cmp(&self.timestamp),
            }
        })
    }
}

impl PartialOrd for VersionedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", PrettyKey(&self.key))?;
        if !self.timestamp.is_zero() {
            write!(f, "@{}", self.timestamp)?;
        }
        Ok(())
    }
}

/// Printable rendering of raw key bytes; non-printable bytes are escaped.
pub struct PrettyKey<'a>(pub &'a [u8]);

impl fmt::Display for PrettyKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

/// Half-open key span `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRange {
    pub start: Key,
    pub end: Key,
}

impl KeyRange {
    pub fn new(start: impl Into<Key>, end: impl Into<Key>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Returns true if `key` falls inside the span.
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && key < self.end.as_slice()
    }

    pub fn start_key(&self) -> VersionedKey {
        VersionedKey::first_of(&self.start)
    }

    pub fn end_key(&self) -> VersionedKey {
        VersionedKey::first_of(&self.end)
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})", PrettyKey(&self.start), PrettyKey(&self.end))
    }
}
