//! RANGEINGEST - Evaluation Results
//! What an evaluation hands to the replication layer. Everything here is
//! serialized with bincode and must encode identically on every replica.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::engine::sstable::SortedTable;
use crate::engine::stats::RangeStats;
use crate::error::{IngestError, Result};

use super::projection::Projection;

/// The table payload plus the checksum replicas verify before applying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddSstable {
    pub data: Bytes,
    pub crc32: u32,
}

impl AddSstable {
    pub fn new(table: &SortedTable) -> Self {
        Self {
            data: table.bytes(),
            crc32: table.checksum(),
        }
    }

    /// Recompute the checksum over the carried bytes.
    pub fn verify(&self) -> Result<()> {
        let actual = crc32fast::hash(&self.data);
        if actual != self.crc32 {
            return Err(IngestError::Corruption(format!(
                "replicated table checksum mismatch: expected {:#010x}, got {:#010x}",
                self.crc32, actual
            )));
        }
        Ok(())
    }

    pub fn table(&self) -> SortedTable {
        SortedTable::from_bytes(self.data.clone())
    }
}

/// Side effects of an evaluation, applied identically by every replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicatedResult {
    pub add_sstable: AddSstable,
    pub columnar: Projection,
}

impl ReplicatedResult {
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| IngestError::Serialization(e.to_string()))
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| IngestError::Serialization(e.to_string()))
    }
}

/// Everything an evaluation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalResult {
    pub replicated: ReplicatedResult,
    /// The finalized delta, already merged into the caller's stats.
    pub delta: RangeStats,
    /// Table entries that exactly duplicated committed entries.
    pub skipped_duplicates: u64,
}
