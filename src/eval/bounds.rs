//! RANGEINGEST - Bounds Validation
//! Rejects tables whose keys escape the request span.

use crate::engine::iterator::StorageIterator;
use crate::error::{Bound, EvalPhase, IngestError, Result};
use crate::types::{KeyRange, VersionedKey};

/// Fails with `OutOfRange` if the table's first key sorts before
/// `span.start` or any key sits at or after `span.end`.
///
/// `iter` must not carry an upper bound, or keys past the end would be
/// hidden from the second check.
pub fn check_bounds<I: StorageIterator + ?Sized>(iter: &mut I, span: &KeyRange) -> Result<()> {
    let storage = IngestError::storage(EvalPhase::BoundsCheck);

    iter.seek(&VersionedKey::min());
    if iter.valid().map_err(&storage)? {
        let first = iter.key();
        if first.less(&span.start_key()) {
            return Err(IngestError::OutOfRange {
                bound: Bound::First,
                key: first.clone(),
                start: span.start.clone(),
                end: span.end.clone(),
            });
        }
    }

    iter.seek(&span.end_key());
    if iter.valid().map_err(&storage)? {
        return Err(IngestError::OutOfRange {
            bound: Bound::Last,
            key: iter.key().clone(),
            start: span.start.clone(),
            end: span.end.clone(),
        });
    }
    Ok(())
}
