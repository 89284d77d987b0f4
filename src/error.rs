//! RANGEINGEST - Custom Error Types
//! Defines the error hierarchy for sorted-table ingestion.

use std::fmt;

use thiserror::Error;

use crate::types::{Key, PrettyKey, VersionedKey};

/// Custom Result type for ingestion evaluation.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Which side of the declared span a table key escaped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    First,
    Last,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::First => f.write_str("first"),
            Bound::Last => f.write_str("last"),
        }
    }
}

/// Evaluation phase a storage read failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalPhase {
    BoundsCheck,
    CollisionCheck,
    StatsScan,
}

impl fmt::Display for EvalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalPhase::BoundsCheck => f.write_str("bounds check"),
            EvalPhase::CollisionCheck => f.write_str("collision check"),
            EvalPhase::StatsScan => f.write_str("stats scan"),
        }
    }
}

/// Failures reported by a storage iterator.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Failures reported by the projection collaborator.
#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error("key {0} outside projected span")]
    OutOfSpan(VersionedKey),

    #[error("projection encoding failed: {0}")]
    Encoding(String),

    #[error("{0}")]
    Other(String),
}

/// Error types for sorted-table ingestion.
#[derive(Error, Debug)]
pub enum IngestError {
    /// I/O errors from reading or writing table files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Data corruption detected (bad framing or CRC mismatch).
    #[error("Data corruption detected: {0}")]
    Corruption(String),

    /// Keys handed to a table writer were not strictly increasing.
    #[error("key {key} added after {prev}: table keys must be strictly increasing")]
    UnsortedInput { prev: VersionedKey, key: VersionedKey },

    /// A table key falls outside the request span.
    #[error("{bound} key {key} not in request range [{},{})", PrettyKey(.start), PrettyKey(.end))]
    OutOfRange {
        bound: Bound,
        key: VersionedKey,
        start: Key,
        end: Key,
    },

    /// A table key would overwrite a differing committed entry.
    #[error("ingested key collides with an existing one: {key}")]
    ShadowedKey { key: VersionedKey },

    /// The storage reader failed.
    #[error("{phase}: {source}")]
    StorageRead {
        phase: EvalPhase,
        #[source]
        source: StorageError,
    },

    /// The projection collaborator failed.
    #[error("projecting sorted table: {0}")]
    Projection(#[from] ProjectionError),

    /// Supplied statistics disagree with a full scan of the table.
    #[error("internal consistency fault: {0}")]
    InternalConsistency(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl IngestError {
    pub(crate) fn storage(phase: EvalPhase) -> impl Fn(StorageError) -> IngestError {
        move |source| IngestError::StorageRead { phase, source }
    }

    /// Faults that signal a defect rather than a bad request. Callers must
    /// stop applying commands on the affected range when they see one.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::InternalConsistency(_))
    }
}
