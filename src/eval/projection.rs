//! RANGEINGEST - Columnar Projection
//! The projection collaborator derives an alternate, column-oriented
//! representation of an ingested table. It runs once per successful
//! evaluation and its output is replicated with the table itself, so it
//! must be a pure function of (span, table bytes).

use serde::{Deserialize, Serialize};

use crate::engine::sstable::SortedTable;
use crate::error::ProjectionError;
use crate::types::KeyRange;

/// Identifies the columnar namespace projected data lands in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceId(pub u64);

/// Column value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Bytes,
    Int64,
    Int32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

/// Describes the layout of projected data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<Column>,
}

/// Output of a projection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub namespace: NamespaceId,
    pub schema: Schema,
    pub data: Vec<u8>,
}

/// Derives projected data from an ingested table.
pub trait Projector {
    fn project(&self, span: &KeyRange, data: &SortedTable) -> Result<Projection, ProjectionError>;
}

/// Column vectors as encoded into `Projection::data`.
#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnarBatch {
    pub keys: Vec<Vec<u8>>,
    pub wall_times: Vec<i64>,
    pub logicals: Vec<i32>,
    pub values: Vec<Vec<u8>>,
}

impl ColumnarBatch {
    pub fn decode(data: &[u8]) -> Result<Self, ProjectionError> {
        bincode::deserialize(data).map_err(|e| ProjectionError::Encoding(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Splits every entry into key, wall time, logical and value columns.
#[derive(Debug, Clone, Default)]
pub struct ColumnarProjector {
    namespace: NamespaceId,
}

impl ColumnarProjector {
    pub fn new(namespace: NamespaceId) -> Self {
        Self { namespace }
    }

    pub fn schema() -> Schema {
        let col = |name: &str, ty| Column {
            name: name.to_string(),
            ty,
        };
        Schema {
            columns: vec![
                col("key", ColumnType::Bytes),
                col("wall_time", ColumnType::Int64),
                col("logical", ColumnType::Int32),
                col("value", ColumnType::Bytes),
            ],
        }
    }
}

impl Projector for ColumnarProjector {
    fn project(&self, span: &KeyRange, data: &SortedTable) -> Result<Projection, ProjectionError> {
        let entries = data
            .entries()
            .map_err(|e| ProjectionError::Other(e.to_string()))?;

        let mut batch = ColumnarBatch::default();
        for (key, value) in entries {
            if !span.contains(&key.key) {
                return Err(ProjectionError::OutOfSpan(key));
            }
            batch.wall_times.push(key.timestamp.wall_time);
            batch.logicals.push(key.timestamp.logical);
            batch.keys.push(key.key);
            batch.values.push(value);
        }

        let data =
            bincode::serialize(&batch).map_err(|e| ProjectionError::Encoding(e.to_string()))?;
        Ok(Projection {
            namespace: self.namespace,
            schema: Self::schema(),
            data,
        })
    }
}
