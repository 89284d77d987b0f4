//! RANGEINGEST - Evaluation Metrics
//! Atomic counters tracking ingestion evaluations in a lock-free,
//! thread-safe manner using `AtomicU64`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::error::IngestError;

/// Atomic counters for AddSSTable evaluation.
///
/// All counters use `Ordering::Relaxed` since we only need
/// eventual consistency for observability, not synchronization.
#[derive(Debug)]
pub struct EvalMetrics {
    evaluations: AtomicU64,
    succeeded: AtomicU64,
    out_of_range: AtomicU64,
    shadow_rejections: AtomicU64,
    storage_errors: AtomicU64,
    projection_errors: AtomicU64,
    consistency_faults: AtomicU64,
    /// Full scans of an incoming table.
    stats_computed: AtomicU64,
    /// Supplied deltas accepted without a scan.
    stats_trusted: AtomicU64,
    stats_verified: AtomicU64,
    skipped_duplicates: AtomicU64,
    /// Encoded table bytes of successful evaluations.
    bytes_ingested: AtomicU64,
    started: Instant,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub evaluations: u64,
    pub succeeded: u64,
    pub out_of_range: u64,
    pub shadow_rejections: u64,
    pub storage_errors: u64,
    pub projection_errors: u64,
    pub consistency_faults: u64,
    pub stats_computed: u64,
    pub stats_trusted: u64,
    pub stats_verified: u64,
    pub skipped_duplicates: u64,
    pub bytes_ingested: u64,
}

impl MetricsSnapshot {
    pub fn failed(&self) -> u64 {
        self.evaluations - self.succeeded
    }
}

impl EvalMetrics {
    /// Create a new metrics instance with all counters at zero.
    pub fn new() -> Self {
        Self {
            evaluations: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            out_of_range: AtomicU64::new(0),
            shadow_rejections: AtomicU64::new(0),
            storage_errors: AtomicU64::new(0),
            projection_errors: AtomicU64::new(0),
            consistency_faults: AtomicU64::new(0),
            stats_computed: AtomicU64::new(0),
            stats_trusted: AtomicU64::new(0),
            stats_verified: AtomicU64::new(0),
            skipped_duplicates: AtomicU64::new(0),
            bytes_ingested: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn record_evaluation(&self) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, table_bytes: usize, skipped: u64) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.bytes_ingested
            .fetch_add(table_bytes as u64, Ordering::Relaxed);
        self.skipped_duplicates.fetch_add(skipped, Ordering::Relaxed);
    }

    /// Count a failed evaluation under its error class.
    pub fn record_failure(&self, err: &IngestError) {
        let counter = match err {
            IngestError::OutOfRange { .. } => &self.out_of_range,
            IngestError::ShadowedKey { .. } => &self.shadow_rejections,
            IngestError::StorageRead { .. } => &self.storage_errors,
            IngestError::Projection(_) => &self.projection_errors,
            IngestError::InternalConsistency(_) => &self.consistency_faults,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stats_computed(&self) {
        self.stats_computed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stats_trusted(&self) {
        self.stats_trusted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stats_verified(&self) {
        self.stats_verified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            evaluations: self.evaluations.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            out_of_range: self.out_of_range.load(Ordering::Relaxed),
            shadow_rejections: self.shadow_rejections.load(Ordering::Relaxed),
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
            projection_errors: self.projection_errors.load(Ordering::Relaxed),
            consistency_faults: self.consistency_faults.load(Ordering::Relaxed),
            stats_computed: self.stats_computed.load(Ordering::Relaxed),
            stats_trusted: self.stats_trusted.load(Ordering::Relaxed),
            stats_verified: self.stats_verified.load(Ordering::Relaxed),
            skipped_duplicates: self.skipped_duplicates.load(Ordering::Relaxed),
            bytes_ingested: self.bytes_ingested.load(Ordering::Relaxed),
        }
    }

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Format metrics as a human-readable report.
    pub fn report(&self) -> String {
        let s = self.snapshot();
        format!(
            "\n═══ AddSSTable Metrics ═══\n\
             Evaluations:\n\
               total:        {}\n\
               succeeded:    {}\n\
               failed:       {}\n\
             Rejections:\n\
               out of range: {}\n\
               shadowed:     {}\n\
               storage:      {}\n\
               projection:   {}\n\
               consistency:  {}\n\
             Statistics:\n\
               computed:     {}\n\
               trusted:      {}\n\
               verified:     {}\n\
               duplicates:   {}\n\
             I/O:\n\
               ingested:     {} bytes\n\
             Uptime: {:.2}s",
            s.evaluations,
            s.succeeded,
            s.failed(),
            s.out_of_range,
            s.shadow_rejections,
            s.storage_errors,
            s.projection_errors,
            s.consistency_faults,
            s.stats_computed,
            s.stats_trusted,
            s.stats_verified,
            s.skipped_duplicates,
            s.bytes_ingested,
            self.uptime_secs(),
        )
    }
}

impl Default for EvalMetrics {
    fn default() -> Self {
        Self::new()
    }
}
