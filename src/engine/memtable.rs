//! RANGEINGEST - MemTable (Committed Range Data)
//! In-process sorted store of the versioned entries already committed to a
//! range. Serves as the storage reader the collision detector merges
//! against, and as the apply target for replicated ingestion results.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included, Unbounded};

use crate::error::StorageError;
use crate::types::{Key, Value, VersionedKey};

use super::iterator::{IterOptions, Reader, StorageIterator};

/// In-memory sorted versioned store backed by a BTreeMap.
pub struct MemTable {
    /// Versioned entries; an empty value is a tombstone.
    entries: BTreeMap<VersionedKey, Value>,
}

impl MemTable {
    /// Create a new, empty MemTable.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Returns the number of versioned entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a versioned entry, replacing an identical version if present.
    pub fn insert(&mut self, key: VersionedKey, value: Value) {
        self.entries.insert(key, value);
    }

    /// All entries in key order.
    pub fn scan(&self) -> Vec<(VersionedKey, Value)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Open an iterator over the committed entries.
    pub fn iter(&self, opts: IterOptions) -> MemTableIterator<'_> {
        MemTableIterator {
            entries: &self.entries,
            upper_bound: opts.upper_bound,
            current: None,
            closed: false,
        }
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Reader for MemTable {
    fn new_iterator(&self, opts: IterOptions) -> Box<dyn StorageIterator + '_> {
        Box::new(self.iter(opts))
    }
}

/// Cursor over a MemTable. Starts unpositioned; call `seek` first.
pub struct MemTableIterator<'a> {
    entries: &'a BTreeMap<VersionedKey, Value>,
    upper_bound: Option<Key>,
    current: Option<(&'a VersionedKey, &'a Value)>,
    closed: bool,
}

impl<'a> MemTableIterator<'a> {
    fn bounded(
        &self,
        entry: Option<(&'a VersionedKey, &'a Value)>,
    ) -> Option<(&'a VersionedKey, &'a Value)> {
        entry.filter(|(k, _)| match &self.upper_bound {
            Some(bound) => k.key.as_slice() < bound.as_slice(),
            None => true,
        })
    }
}

impl StorageIterator for MemTableIterator<'_> {
    fn seek(&mut self, target: &VersionedKey) {
        let found = self
            .entries
            .range::<VersionedKey, _>((Included(target), Unbounded))
            .next();
        self.current = self.bounded(found);
    }

    fn valid(&self) -> Result<bool, StorageError> {
        if self.closed {
            return Err(StorageError::Unavailable("iterator closed".into()));
        }
        Ok(self.current.is_some())
    }

    fn key(&self) -> &VersionedKey {
        match self.current {
            Some((k, _)) => k,
            None => panic!("key() called on invalid MemTable iterator"),
        }
    }

    fn value(&self) -> &[u8] {
        match self.current {
            Some((_, v)) => v,
            None => panic!("value() called on invalid MemTable iterator"),
        }
    }

    fn next(&mut self) {
        if let Some((k, _)) = self.current {
            let found = self
                .entries
                .range::<VersionedKey, _>((Excluded(k), Unbounded))
                .next();
            self.current = self.bounded(found);
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.current = None;
    }
}
