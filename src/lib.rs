//! RANGEINGEST - Sorted-Table Ingestion Evaluator
//!
//! Deterministic evaluation of bulk-ingestion commands against a replicated
//! key range: an immutable sorted table is validated against the request
//! span, optionally checked for collisions with committed data, and turned
//! into a statistics delta plus a checksummed replicated result that every
//! replica reproduces byte for byte.
//!
//! ## Features
//! - **Sorted Table**: length-prefixed, CRC32-sealed table format with a seekable iterator
//! - **Bounds Validation**: rejects tables with keys outside the request span
//! - **Collision Detection**: merge-scan against committed data; exact duplicates are tolerated
//! - **Statistics Engine**: single-pass live/garbage accounting with an associative merge
//! - **Fast Path**: trusts caller-supplied statistics, with optional verification
//! - **Projection**: columnar view of ingested data, replicated with the table
//! - **Metrics**: Lock-free atomic counters for observability
//!
//! ## Example
//! ```no_run
//! use rangeingest::config::Config;
//! use rangeingest::engine::Replica;
//! use rangeingest::engine::sstable::SortedTableWriter;
//! use rangeingest::eval::projection::ColumnarProjector;
//! use rangeingest::eval::{AddSstRequest, Header};
//! use rangeingest::types::{KeyRange, Timestamp, VersionedKey};
//!
//! let span = KeyRange::new(b"/1".to_vec(), b"/9".to_vec());
//! let mut replica = Replica::new(span.clone(), Config::default());
//!
//! let mut writer = SortedTableWriter::new();
//! writer.add(VersionedKey::new(b"/2".to_vec(), Timestamp::new(5, 0)), b"a").unwrap();
//! let req = AddSstRequest::new(span, writer.finish()).disallow_shadowing();
//!
//! let header = Header::at(Timestamp::new(5, 0));
//! let result = replica.evaluate(&header, &req, &ColumnarProjector::default()).unwrap();
//! replica.apply(&result.replicated).unwrap();
//! assert_eq!(replica.stats().key_count, 1);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod types;
