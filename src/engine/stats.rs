//! RANGEINGEST - Range Statistics
//! Accounting aggregate kept per range, plus the single-pass statistics
//! engine that derives a delta from a key-ordered stream of entries.
//!
//! Deltas combine field-wise: counters add, `contains_estimates` ORs and
//! `last_update_nanos` takes the max. All three are associative and
//! commutative, so folding a set of deltas is order-independent.

use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::types::{Key, VersionedKey};

use super::iterator::StorageIterator;

/// Byte and key accounting for a range, or a delta to one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeStats {
    /// Set when the figures may be inexact pending a full recomputation.
    pub contains_estimates: bool,
    pub last_update_nanos: i64,
    /// Bytes of the newest non-tombstone version of each key.
    pub live_bytes: i64,
    pub live_count: i64,
    pub key_bytes: i64,
    /// Distinct user keys.
    pub key_count: i64,
    pub val_bytes: i64,
    /// Versions, tombstones included.
    pub val_count: i64,
    /// Bytes held by shadowed versions and tombstones.
    pub garbage_bytes: i64,
    pub garbage_count: i64,
}

impl RangeStats {
    /// Merge `other` into `self`.
    pub fn add(&mut self, other: &RangeStats) {
        self.contains_estimates |= other.contains_estimates;
        self.last_update_nanos = self.last_update_nanos.max(other.last_update_nanos);
        self.live_bytes += other.live_bytes;
        self.live_count += other.live_count;
        self.key_bytes += other.key_bytes;
        self.key_count += other.key_count;
        self.val_bytes += other.val_bytes;
        self.val_count += other.val_count;
        self.garbage_bytes += other.garbage_bytes;
        self.garbage_count += other.garbage_count;
    }

    /// Remove `other`'s counters from `self`.
    pub fn subtract(&mut self, other: &RangeStats) {
        self.contains_estimates |= other.contains_estimates;
        self.last_update_nanos = self.last_update_nanos.max(other.last_update_nanos);
        self.live_bytes -= other.live_bytes;
        self.live_count -= other.live_count;
        self.key_bytes -= other.key_bytes;
        self.key_count -= other.key_count;
        self.val_bytes -= other.val_bytes;
        self.val_count -= other.val_count;
        self.garbage_bytes -= other.garbage_bytes;
        self.garbage_count -= other.garbage_count;
    }

    /// True when every counter is zero; flags and timestamps are ignored.
    pub fn is_zero_delta(&self) -> bool {
        let mut counters = *self;
        counters.contains_estimates = false;
        counters.last_update_nanos = 0;
        counters == RangeStats::default()
    }

    /// Field-by-field description of where `self` and `other` disagree.
    pub fn diff(&self, other: &RangeStats) -> Vec<String> {
        let mut out = Vec::new();
        if self.contains_estimates != other.contains_estimates {
            out.push(format!(
                "contains_estimates: {} != {}",
                self.contains_estimates, other.contains_estimates
            ));
        }
        let fields = [
            ("last_update_nanos", self.last_update_nanos, other.last_update_nanos),
            ("live_bytes", self.live_bytes, other.live_bytes),
            ("live_count", self.live_count, other.live_count),
            ("key_bytes", self.key_bytes, other.key_bytes),
            ("key_count", self.key_count, other.key_count),
            ("val_bytes", self.val_bytes, other.val_bytes),
            ("val_count", self.val_count, other.val_count),
            ("garbage_bytes", self.garbage_bytes, other.garbage_bytes),
            ("garbage_count", self.garbage_count, other.garbage_count),
        ];
        for (name, a, b) in fields {
            if a != b {
                out.push(format!("{}: {} != {}", name, a, b));
            }
        }
        out
    }
}

impl AddAssign<&RangeStats> for RangeStats {
    fn add_assign(&mut self, rhs: &RangeStats) {
        RangeStats::add(self, rhs);
    }
}

impl AddAssign for RangeStats {
    fn add_assign(&mut self, rhs: RangeStats) {
        RangeStats::add(self, &rhs);
    }
}

impl Add for RangeStats {
    type Output = RangeStats;

    fn add(mut self, rhs: RangeStats) -> RangeStats {
        self += rhs;
        self
    }
}

impl SubAssign<&RangeStats> for RangeStats {
    fn sub_assign(&mut self, rhs: &RangeStats) {
        RangeStats::subtract(self, rhs);
    }
}

impl SubAssign for RangeStats {
    fn sub_assign(&mut self, rhs: RangeStats) {
        self.subtract(&rhs);
    }
}

impl Sub for RangeStats {
    type Output = RangeStats;

    fn sub(mut self, rhs: RangeStats) -> RangeStats {
        self -= rhs;
        self
    }
}

/// Per-entry accounting over a key-ordered stream.
///
/// Remembers the user key of the previous entry so it can tell a key's
/// newest version (counted as a new key, live unless a tombstone) from the
/// older versions behind it (garbage).
#[derive(Debug, Default)]
pub struct StatsAccumulator {
    prev_key: Option<Key>,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contribution of `key`/`value`, which must follow the previously
    /// accounted entry in key order.
    pub fn contribution(&mut self, key: &VersionedKey, value: &[u8]) -> RangeStats {
        let first_version = self.prev_key.as_deref() != Some(key.key.as_slice());
        if first_version {
            self.prev_key = Some(key.key.clone());
        }

        let key_len = key.encoded_len() as i64;
        let val_len = value.len() as i64;
        let mut delta = RangeStats {
            key_bytes: key_len,
            val_bytes: val_len,
            val_count: 1,
            ..Default::default()
        };
        if first_version {
            delta.key_count = 1;
        }
        if first_version && !value.is_empty() {
            delta.live_bytes = key_len + val_len;
            delta.live_count = 1;
        } else {
            delta.garbage_bytes = key_len + val_len;
            delta.garbage_count = 1;
        }
        delta
    }
}

/// Statistics of every entry in `[start, end)` as if nothing else lived in
/// that span. Single forward pass; `last_update_nanos` is set to `now_nanos`.
pub fn compute_stats<I: StorageIterator + ?Sized>(
    iter: &mut I,
    start: &[u8],
    end: &[u8],
    now_nanos: i64,
) -> Result<RangeStats, StorageError> {
    let mut stats = RangeStats {
        last_update_nanos: now_nanos,
        ..Default::default()
    };
    let mut acc = StatsAccumulator::new();
    iter.seek(&VersionedKey::first_of(start));
    while iter.valid()? {
        let key = iter.key();
        if key.key.as_slice() >= end {
            break;
        }
        stats += acc.contribution(key, iter.value());
        iter.next();
    }
    Ok(stats)
}
