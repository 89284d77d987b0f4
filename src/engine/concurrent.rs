//! RANGEINGEST - Shared Replica
//! Thread-safe wrapper around a `Replica` using Arc + Mutex.
//!
//! ## Concurrency Model
//! Evaluation assumes nobody mutates the range's committed data while its
//! scans run, and performs no locking of its own. This wrapper supplies
//! that guarantee: every command (evaluate + apply) runs under one
//! exclusive lock, so at most one command touches the range at a time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::Config;
use crate::error::Result;
use crate::eval::projection::Projector;
use crate::eval::result::EvalResult;
use crate::eval::{AddSstRequest, Header};
use crate::types::{KeyRange, Value, VersionedKey};

use super::metrics::MetricsSnapshot;
use super::stats::RangeStats;
use super::Replica;

/// Thread-safe handle to a range replica.
///
/// ## Example
/// ```no_run
/// use rangeingest::config::Config;
/// use rangeingest::engine::concurrent::SharedReplica;
/// use rangeingest::types::KeyRange;
/// use std::thread;
///
/// let span = KeyRange::new(b"a".to_vec(), b"z".to_vec());
/// let replica = SharedReplica::new(span, Config::default());
/// let handle = replica.clone();
/// thread::spawn(move || println!("{:?}", handle.stats()));
/// ```
#[derive(Clone)]
pub struct SharedReplica {
    inner: Arc<Mutex<Replica>>,
}

impl SharedReplica {
    pub fn new(span: KeyRange, config: Config) -> Self {
        Self::from_replica(Replica::new(span, config))
    }

    pub fn from_replica(replica: Replica) -> Self {
        Self {
            inner: Arc::new(Mutex::new(replica)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Replica> {
        // A panic mid-command cannot leave partial stats behind: the merge
        // is the last step of evaluation.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Evaluate and, on success, apply an ingestion as one command.
    pub fn ingest(
        &self,
        header: &Header,
        req: &AddSstRequest,
        projector: &dyn Projector,
    ) -> Result<EvalResult> {
        let mut replica = self.lock();
        let result = replica.evaluate(header, req, projector)?;
        replica.apply(&result.replicated)?;
        Ok(result)
    }

    pub fn put(&self, key: VersionedKey, value: Value, now_nanos: i64) -> Result<()> {
        self.lock().put(key, value, now_nanos)
    }

    pub fn recompute_stats(&self, now_nanos: i64) -> Result<RangeStats> {
        self.lock().recompute_stats(now_nanos)
    }

    pub fn compute_stats_from_scratch(&self, now_nanos: i64) -> Result<RangeStats> {
        self.lock().compute_stats_from_scratch(now_nanos)
    }

    /// Current running statistics.
    pub fn stats(&self) -> RangeStats {
        *self.lock().stats()
    }

    /// Number of committed versioned entries.
    pub fn len(&self) -> usize {
        self.lock().data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().data().is_empty()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.lock().metrics().snapshot()
    }

    /// Run `f` against the replica while holding the lock.
    pub fn with_replica<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Replica) -> R,
    {
        f(&self.lock())
    }
}
