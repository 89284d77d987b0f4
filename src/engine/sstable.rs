//! RANGEINGEST - Sorted Table
//! Immutable, key-ordered batch of versioned entries: the payload of an
//! ingestion request. Produced by `SortedTableWriter`, consumed read-only
//! through `SstIterator`.

use std::fs;
use std::path::Path;

use bytes::Bytes;

use crate::error::{IngestError, Result, StorageError};
use crate::types::{Key, Timestamp, Value, VersionedKey};

use super::iterator::StorageIterator;

const MAGIC: &[u8; 4] = b"RSST";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 5;
/// entry_count (8) + crc (4)
const FOOTER_LEN: usize = 12;

/// Builds the encoded form of a sorted table.
///
/// ## Binary Format
/// ```text
/// [magic "RSST"][version: 1 byte]
/// per entry: [key_len: u32][key][wall_time: i64][logical: i32][val_len: u32][value]
/// [entry_count: u64][crc32 of all preceding bytes: u32]
/// ```
/// All integers are little-endian.
pub struct SortedTableWriter {
    buf: Vec<u8>,
    last: Option<VersionedKey>,
    count: u64,
}

impl SortedTableWriter {
    pub fn new() -> Self {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(MAGIC);
        buf.push(FORMAT_VERSION);
        Self {
            buf,
            last: None,
            count: 0,
        }
    }

    /// Append an entry. Keys must arrive in strictly increasing order.
    pub fn add(&mut self, key: VersionedKey, value: &[u8]) -> Result<()> {
        if let Some(prev) = &self.last {
            if key <= *prev {
                return Err(IngestError::UnsortedInput {
                    prev: prev.clone(),
                    key,
                });
            }
        }
        self.buf.extend_from_slice(&(key.key.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(&key.key);
        self.buf.extend_from_slice(&key.timestamp.wall_time.to_le_bytes());
        self.buf.extend_from_slice(&key.timestamp.logical.to_le_bytes());
        self.buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(value);
        self.last = Some(key);
        self.count += 1;
        Ok(())
    }

    /// Number of entries added so far.
    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Seal the table with its footer.
    pub fn finish(mut self) -> SortedTable {
        self.buf.extend_from_slice(&self.count.to_le_bytes());
        let crc = crc32fast::hash(&self.buf);
        self.buf.extend_from_slice(&crc.to_le_bytes());
        SortedTable {
            data: Bytes::from(self.buf),
        }
    }

    /// Seal the table and write it to `path`.
    pub fn finish_to_file(self, path: impl AsRef<Path>) -> Result<SortedTable> {
        let table = self.finish();
        fs::write(path, &table.data)?;
        Ok(table)
    }
}

impl Default for SortedTableWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// An encoded sorted table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedTable {
    data: Bytes,
}

impl SortedTable {
    /// Wrap already-encoded bytes. Validation happens in `iter`.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Load an encoded table from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_bytes(fs::read(path)?))
    }

    /// Build a table from entries already in sorted order.
    pub fn from_entries<'a, I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (VersionedKey, &'a [u8])>,
    {
        let mut writer = SortedTableWriter::new();
        for (key, value) in entries {
            writer.add(key, value)?;
        }
        Ok(writer.finish())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Encoded size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// CRC32 over the exact encoded bytes.
    pub fn checksum(&self) -> u32 {
        crc32fast::hash(&self.data)
    }

    /// Decode and validate the table, returning an unbounded iterator.
    pub fn iter(&self) -> Result<SstIterator> {
        Ok(SstIterator::new(decode(&self.data)?, None))
    }

    /// Like `iter`, hiding entries whose user key is `>= upper_bound`.
    pub fn iter_bounded(&self, upper_bound: impl Into<Key>) -> Result<SstIterator> {
        Ok(SstIterator::new(decode(&self.data)?, Some(upper_bound.into())))
    }

    /// Decode every entry into owned pairs.
    pub fn entries(&self) -> Result<Vec<(VersionedKey, Value)>> {
        Ok(decode(&self.data)?
            .into_iter()
            .map(|e| (e.key, e.value.to_vec()))
            .collect())
    }
}

struct SstEntry {
    key: VersionedKey,
    value: Bytes,
}

fn corruption(msg: impl Into<String>) -> IngestError {
    IngestError::Corruption(msg.into())
}

struct Cursor<'a> {
    data: &'a Bytes,
    pos: usize,
    end: usize,
}

impl Cursor<'_> {
    fn take(&mut self, n: usize) -> Result<std::ops::Range<usize>> {
        if self.end - self.pos < n {
            return Err(corruption(format!(
                "sorted table truncated at offset {}",
                self.pos
            )));
        }
        let range = self.pos..self.pos + n;
        self.pos += n;
        Ok(range)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let range = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[range]);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }
}

fn decode(data: &Bytes) -> Result<Vec<SstEntry>> {
    if data.len() < HEADER_LEN + FOOTER_LEN {
        return Err(corruption(format!(
            "sorted table too short: {} bytes",
            data.len()
        )));
    }
    if &data[..4] != MAGIC {
        return Err(corruption("bad sorted table magic"));
    }
    if data[4] != FORMAT_VERSION {
        return Err(corruption(format!(
            "unsupported sorted table version {}",
            data[4]
        )));
    }

    let body_end = data.len() - FOOTER_LEN;
    let crc_offset = data.len() - 4;
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&data[crc_offset..]);
    let stored_crc = u32::from_le_bytes(crc_bytes);
    let computed_crc = crc32fast::hash(&data[..crc_offset]);
    if stored_crc != computed_crc {
        return Err(corruption(format!(
            "sorted table CRC mismatch: stored {:#010x}, computed {:#010x}",
            stored_crc, computed_crc
        )));
    }
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&data[body_end..crc_offset]);
    let expected = u64::from_le_bytes(count_bytes);

    let mut cursor = Cursor {
        data,
        pos: HEADER_LEN,
        end: body_end,
    };
    let mut entries: Vec<SstEntry> = Vec::new();
    while cursor.pos < cursor.end {
        let key_len = cursor.u32()? as usize;
        let key_range = cursor.take(key_len)?;
        let wall_time = i64::from_le_bytes(cursor.array()?);
        let logical = i32::from_le_bytes(cursor.array()?);
        let val_len = cursor.u32()? as usize;
        let val_range = cursor.take(val_len)?;

        let key = VersionedKey::new(
            data[key_range].to_vec(),
            Timestamp::new(wall_time, logical),
        );
        if let Some(prev) = entries.last() {
            if key <= prev.key {
                return Err(corruption(format!(
                    "sorted table out of order: {} after {}",
                    key, prev.key
                )));
            }
        }
        entries.push(SstEntry {
            key,
            value: data.slice(val_range),
        });
    }
    if entries.len() as u64 != expected {
        return Err(corruption(format!(
            "sorted table holds {} entries, footer says {}",
            entries.len(),
            expected
        )));
    }
    Ok(entries)
}

/// Seekable iterator over a decoded sorted table.
pub struct SstIterator {
    entries: Vec<SstEntry>,
    pos: usize,
    upper_bound: Option<Key>,
    closed: bool,
}

impl SstIterator {
    fn new(entries: Vec<SstEntry>, upper_bound: Option<Key>) -> Self {
        let mut iter = Self {
            entries,
            pos: 0,
            upper_bound,
            closed: false,
        };
        iter.clip();
        iter
    }

    /// Number of entries visible below the upper bound.
    pub fn len(&self) -> usize {
        match &self.upper_bound {
            Some(bound) => self
                .entries
                .partition_point(|e| e.key.key.as_slice() < bound.as_slice()),
            None => self.entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn clip(&mut self) {
        let limit = self.len();
        if self.pos > limit {
            self.pos = limit;
        }
    }
}

impl StorageIterator for SstIterator {
    fn seek(&mut self, target: &VersionedKey) {
        self.pos = self.entries.partition_point(|e| e.key < *target);
        self.clip();
    }

    fn valid(&self) -> std::result::Result<bool, StorageError> {
        if self.closed {
            return Err(StorageError::Unavailable("iterator closed".into()));
        }
        Ok(self.pos < self.len())
    }

    fn key(&self) -> &VersionedKey {
        &self.entries[self.pos].key
    }

    fn value(&self) -> &[u8] {
        &self.entries[self.pos].value
    }

    fn next(&mut self) {
        if self.pos < self.len() {
            self.pos += 1;
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.entries.clear();
        self.pos = 0;
    }
}
