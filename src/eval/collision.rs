//! RANGEINGEST - Key Collision Detection
//! Merge-scans committed range data against an incoming table when
//! shadowing is disallowed.
//!
//! A table entry identical to a committed one (same key, timestamp and
//! value) is not a collision: re-writing it changes nothing, so its
//! statistics are collected for the evaluator to subtract. Any other table
//! entry whose user key already exists in the range is a collision.

use std::cmp::Ordering;

use crate::engine::iterator::{IterGuard, IterOptions, Reader, StorageIterator};
use crate::engine::sstable::SortedTable;
use crate::engine::stats::{RangeStats, StatsAccumulator};
use crate::error::{EvalPhase, IngestError, Result};
use crate::types::{KeyRange, VersionedKey};

/// Statistics of table entries that exactly duplicate committed entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionCheckResult {
    /// Summed contribution of the duplicates, as the table scan counted them.
    pub skipped: RangeStats,
    /// Number of duplicate entries.
    pub skipped_count: u64,
}

/// Opens iterators over `reader` and `data` restricted to `span` and runs
/// `check_for_key_collisions`. Both iterators are closed on every path.
pub fn check_span_for_collisions(
    reader: &dyn Reader,
    data: &SortedTable,
    span: &KeyRange,
) -> Result<CollisionCheckResult> {
    let mut existing = IterGuard::new(reader.new_iterator(IterOptions::with_upper_bound(
        span.end.clone(),
    )));
    existing.seek(&span.start_key());
    if !existing
        .valid()
        .map_err(IngestError::storage(EvalPhase::CollisionCheck))?
    {
        // Nothing committed in the span, so nothing can collide.
        return Ok(CollisionCheckResult::default());
    }

    let mut table = IterGuard::new(data.iter_bounded(span.end.clone())?);
    check_for_key_collisions(&mut *existing, &mut *table, span)
}

/// Lockstep merge of `existing` against `table` over `span`.
pub fn check_for_key_collisions<E, T>(
    existing: &mut E,
    table: &mut T,
    span: &KeyRange,
) -> Result<CollisionCheckResult>
where
    E: StorageIterator + ?Sized,
    T: StorageIterator + ?Sized,
{
    let storage = IngestError::storage(EvalPhase::CollisionCheck);
    let mut result = CollisionCheckResult::default();
    let mut acc = StatsAccumulator::new();

    existing.seek(&span.start_key());
    table.seek(&span.start_key());

    while table.valid().map_err(&storage)? && existing.valid().map_err(&storage)? {
        if table.key().key.as_slice() >= span.end.as_slice() {
            break;
        }
        match existing.key().key.cmp(&table.key().key) {
            Ordering::Less => {
                let target = VersionedKey::first_of(&table.key().key);
                existing.seek(&target);
            }
            Ordering::Greater => {
                acc.contribution(table.key(), table.value());
                table.next();
            }
            Ordering::Equal => {
                // The user key exists: every table version of it must have an
                // identical committed version.
                let user_key = table.key().key.clone();
                loop {
                    while existing.valid().map_err(&storage)?
                        && existing.key().key == user_key
                        && existing.key() < table.key()
                    {
                        existing.next();
                    }
                    let identical = existing.valid().map_err(&storage)?
                        && existing.key() == table.key()
                        && existing.value() == table.value();
                    if !identical {
                        return Err(shadowed(table.key()));
                    }
                    result.skipped += acc.contribution(table.key(), table.value());
                    result.skipped_count += 1;
                    log::trace!("skipping duplicate of committed entry {}", table.key());
                    table.next();
                    existing.next();
                    if !table.valid().map_err(&storage)? || table.key().key != user_key {
                        break;
                    }
                }
            }
        }
    }
    Ok(result)
}

fn shadowed(key: &VersionedKey) -> IngestError {
    IngestError::ShadowedKey { key: key.clone() }
}
