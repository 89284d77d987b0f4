//! RANGEINGEST - Storage Iterator Capability
//! The only view of storage the evaluator depends on: seek, read the
//! current entry, advance, check validity, close. Implemented by the
//! in-memory sorted table reader and by the committed-data MemTable;
//! any other engine (embedded or remote) plugs in through the same traits.

use std::ops::{Deref, DerefMut};

use crate::error::StorageError;
use crate::types::{Key, VersionedKey};

/// Positioned cursor over key-ordered entries.
///
/// `key` and `value` may only be called after `valid` returned `Ok(true)`.
pub trait StorageIterator {
    /// Position at the first entry `>= target`.
    fn seek(&mut self, target: &VersionedKey);

    /// Whether the cursor points at an entry. Surfaces deferred read errors.
    fn valid(&self) -> Result<bool, StorageError>;

    /// Key of the current entry.
    fn key(&self) -> &VersionedKey;

    /// Value of the current entry.
    fn value(&self) -> &[u8];

    /// Advance to the next entry.
    fn next(&mut self);

    /// Release engine-side resources. Must be idempotent.
    fn close(&mut self);
}

impl<I: StorageIterator + ?Sized> StorageIterator for Box<I> {
    fn seek(&mut self, target: &VersionedKey) {
        (**self).seek(target)
    }

    fn valid(&self) -> Result<bool, StorageError> {
        (**self).valid()
    }

    fn key(&self) -> &VersionedKey {
        (**self).key()
    }

    fn value(&self) -> &[u8] {
        (**self).value()
    }

    fn next(&mut self) {
        (**self).next()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Options for opening an iterator over committed data.
#[derive(Debug, Clone, Default)]
pub struct IterOptions {
    /// Exclusive user-key upper bound; entries at or past it are invisible.
    pub upper_bound: Option<Key>,
}

impl IterOptions {
    pub fn with_upper_bound(upper_bound: impl Into<Key>) -> Self {
        Self {
            upper_bound: Some(upper_bound.into()),
        }
    }
}

/// Read access to committed range data.
pub trait Reader {
    fn new_iterator(&self, opts: IterOptions) -> Box<dyn StorageIterator + '_>;
}

/// Owns an iterator and closes it when dropped, so early returns release it.
pub struct IterGuard<I: StorageIterator> {
    inner: I,
}

impl<I: StorageIterator> IterGuard<I> {
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

impl<I: StorageIterator> Deref for IterGuard<I> {
    type Target = I;

    fn deref(&self) -> &I {
        &self.inner
    }
}

impl<I: StorageIterator> DerefMut for IterGuard<I> {
    fn deref_mut(&mut self) -> &mut I {
        &mut self.inner
    }
}

impl<I: StorageIterator> Drop for IterGuard<I> {
    fn drop(&mut self) {
        self.inner.close();
    }
}
