//! RANGEINGEST - Range Replica
//! Top-level module for the storage-side components, and the replica that
//! ties one key range's committed data to its running statistics.

pub mod concurrent;
pub mod iterator;
pub mod memtable;
pub mod metrics;
pub mod sstable;
pub mod stats;

use crate::config::Config;
use crate::error::{Bound, EvalPhase, IngestError, Result};
use crate::eval::projection::Projector;
use crate::eval::result::{EvalResult, ReplicatedResult};
use crate::eval::{eval_add_sstable, AddSstRequest, EvalContext, Header};
use crate::types::{Key, KeyRange, Value, VersionedKey};

use self::iterator::{IterGuard, IterOptions};
use self::memtable::MemTable;
use self::metrics::EvalMetrics;
use self::stats::{compute_stats, RangeStats};

/// One replica of a key range.
/// Evaluation merges statistics deltas; `apply` lands the replicated
/// table in committed data. Callers serialize commands per range.
pub struct Replica {
    span: KeyRange,
    /// Committed versioned entries.
    data: MemTable,
    /// Running statistics of `data`.
    stats: RangeStats,
    config: Config,
    metrics: EvalMetrics,
}

impl Replica {
    /// Create an empty replica covering `span`.
    pub fn new(span: KeyRange, config: Config) -> Self {
        log::info!("replica for {} created", span);
        Self {
            span,
            data: MemTable::new(),
            stats: RangeStats::default(),
            config,
            metrics: EvalMetrics::new(),
        }
    }

    pub fn span(&self) -> &KeyRange {
        &self.span
    }

    pub fn stats(&self) -> &RangeStats {
        &self.stats
    }

    pub fn data(&self) -> &MemTable {
        &self.data
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &EvalMetrics {
        &self.metrics
    }

    fn check_key(&self, key: &VersionedKey) -> Result<()> {
        if self.span.contains(&key.key) {
            return Ok(());
        }
        let bound = if key.key < self.span.start {
            Bound::First
        } else {
            Bound::Last
        };
        Err(IngestError::OutOfRange {
            bound,
            key: key.clone(),
            start: self.span.start.clone(),
            end: self.span.end.clone(),
        })
    }

    /// Write a single committed version outside of any ingestion, keeping
    /// the running statistics exact for the touched key.
    pub fn put(&mut self, key: VersionedKey, value: Value, now_nanos: i64) -> Result<()> {
        self.check_key(&key)?;
        let user_key = key.key.clone();
        let before = self.key_stats(&user_key, now_nanos)?;
        self.data.insert(key, value);
        let after = self.key_stats(&user_key, now_nanos)?;
        self.stats.add(&after);
        self.stats.subtract(&before);
        Ok(())
    }

    fn key_stats(&self, key: &[u8], now_nanos: i64) -> Result<RangeStats> {
        let mut end: Key = key.to_vec();
        end.push(0);
        let mut iter = IterGuard::new(self.data.iter(IterOptions::with_upper_bound(end.clone())));
        compute_stats(&mut *iter, key, &end, now_nanos)
            .map_err(IngestError::storage(EvalPhase::StatsScan))
    }

    /// Evaluate an ingestion request against this replica's committed data,
    /// merging the resulting delta into its statistics.
    pub fn evaluate(
        &mut self,
        header: &Header,
        req: &AddSstRequest,
        projector: &dyn Projector,
    ) -> Result<EvalResult> {
        if req.span.start < self.span.start || req.span.end > self.span.end {
            let escaped = if req.span.start < self.span.start {
                (Bound::First, req.span.start_key())
            } else {
                (Bound::Last, req.span.end_key())
            };
            return Err(IngestError::OutOfRange {
                bound: escaped.0,
                key: escaped.1,
                start: self.span.start.clone(),
                end: self.span.end.clone(),
            });
        }
        let ctx = EvalContext {
            reader: &self.data,
            projector,
            config: &self.config,
            metrics: &self.metrics,
        };
        eval_add_sstable(&ctx, header, req, &mut self.stats)
    }

    /// Apply a replicated result: verify its checksum and ingest the table.
    /// Returns the number of entries written.
    pub fn apply(&mut self, replicated: &ReplicatedResult) -> Result<usize> {
        let payload = &replicated.add_sstable;
        payload.verify()?;
        let entries = payload.table().entries()?;
        for (key, _) in &entries {
            self.check_key(key)?;
        }
        let count = entries.len();
        for (key, value) in entries {
            self.data.insert(key, value);
        }
        log::debug!("applied {} ingested entries to {}", count, self.span);
        Ok(count)
    }

    /// Exact statistics of the committed data, computed by a full scan.
    pub fn compute_stats_from_scratch(&self, now_nanos: i64) -> Result<RangeStats> {
        let mut iter = IterGuard::new(self.data.iter(IterOptions::with_upper_bound(
            self.span.end.clone(),
        )));
        compute_stats(&mut *iter, &self.span.start, &self.span.end, now_nanos)
            .map_err(IngestError::storage(EvalPhase::StatsScan))
    }

    /// Replace the running statistics with a full recomputation, clearing
    /// `contains_estimates`. Returns the correction that was applied.
    pub fn recompute_stats(&mut self, now_nanos: i64) -> Result<RangeStats> {
        let exact = self.compute_stats_from_scratch(now_nanos)?;
        let mut correction = exact;
        correction.subtract(&self.stats);
        correction.contains_estimates = false;
        if !correction.is_zero_delta() {
            log::info!(
                "stats recomputation for {} corrected: {}",
                self.span,
                self.stats.diff(&exact).join(", ")
            );
        }
        self.stats = exact;
        Ok(correction)
    }
}
