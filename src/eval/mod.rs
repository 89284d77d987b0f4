//! RANGEINGEST - AddSSTable Command Evaluation
//! Validates an ingestion request against its span, optionally checks it
//! for collisions with committed data, works out the statistics delta and
//! packages the replicated result.
//!
//! ## Evaluation steps (terminal on first failure)
//! 1. Bounds check of the table against the request span.
//! 2. Collision check, when shadowing is disallowed.
//! 3. Statistics: trust the supplied delta, verify it, or scan the table.
//! 4. Subtract the statistics of exact duplicates found in step 2.
//! 5. Flag the delta as estimated unless shadowing was disallowed.
//! 6. Project the table (collaborator call).
//! 7. Merge the delta into the range statistics and emit the result.
//!
//! Step 7's merge is the only side effect, so a failure anywhere earlier
//! leaves the range statistics untouched.

pub mod bounds;
pub mod collision;
pub mod projection;
pub mod result;

use crate::config::Config;
use crate::engine::iterator::{IterGuard, Reader};
use crate::engine::metrics::EvalMetrics;
use crate::engine::sstable::SortedTable;
use crate::engine::stats::{compute_stats, RangeStats};
use crate::error::{EvalPhase, IngestError, Result};
use crate::types::{KeyRange, Timestamp};

use self::bounds::check_bounds;
use self::collision::{check_span_for_collisions, CollisionCheckResult};
use self::projection::Projector;
use self::result::{AddSstable, EvalResult, ReplicatedResult};

/// Request-wide evaluation parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    pub timestamp: Timestamp,
}

impl Header {
    pub fn at(timestamp: Timestamp) -> Self {
        Self { timestamp }
    }
}

/// Request to merge a sorted table into `span`.
#[derive(Debug, Clone)]
pub struct AddSstRequest {
    pub span: KeyRange,
    pub data: SortedTable,
    /// Pre-computed statistics delta of `data`, if the caller has one.
    pub stats: Option<RangeStats>,
    /// Reject tables that would overwrite committed entries.
    pub disallow_shadowing: bool,
}

impl AddSstRequest {
    pub fn new(span: KeyRange, data: SortedTable) -> Self {
        Self {
            span,
            data,
            stats: None,
            disallow_shadowing: false,
        }
    }

    pub fn with_stats(mut self, stats: RangeStats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn disallow_shadowing(mut self) -> Self {
        self.disallow_shadowing = true;
        self
    }
}

/// Collaborators an evaluation runs against.
pub struct EvalContext<'a> {
    /// Committed data of the range.
    pub reader: &'a dyn Reader,
    pub projector: &'a dyn Projector,
    pub config: &'a Config,
    pub metrics: &'a EvalMetrics,
}

/// Evaluate an AddSSTable command, merging its delta into `ms` on success.
pub fn eval_add_sstable(
    ctx: &EvalContext<'_>,
    header: &Header,
    req: &AddSstRequest,
    ms: &mut RangeStats,
) -> Result<EvalResult> {
    ctx.metrics.record_evaluation();
    let result = evaluate(ctx, header, req, ms);
    match &result {
        Ok(res) => ctx.metrics.record_success(req.data.len(), res.skipped_duplicates),
        Err(err) => {
            ctx.metrics.record_failure(err);
            log::warn!("AddSSTable {} failed: {}", req.span, err);
        }
    }
    result
}

fn evaluate(
    ctx: &EvalContext<'_>,
    header: &Header,
    req: &AddSstRequest,
    ms: &mut RangeStats,
) -> Result<EvalResult> {
    let span = &req.span;
    log::debug!("evaluating AddSSTable {}", span);

    let mut data_iter = IterGuard::new(req.data.iter()?);
    check_bounds(&mut *data_iter, span)?;

    let collisions = if req.disallow_shadowing {
        Some(check_span_for_collisions(ctx.reader, &req.data, span)?)
    } else {
        None
    };

    let verify = ctx.config.verify_statistics && req.disallow_shadowing && req.stats.is_some();
    let mut stats = match req.stats {
        Some(supplied) if !verify => {
            ctx.metrics.record_stats_trusted();
            supplied
        }
        supplied => {
            log::trace!("computing stats for sorted table {}", span);
            let computed = compute_stats(
                &mut *data_iter,
                &span.start,
                &span.end,
                header.timestamp.wall_time,
            )
            .map_err(IngestError::storage(EvalPhase::StatsScan))?;
            ctx.metrics.record_stats_computed();

            if let Some(mut supplied) = supplied {
                ctx.metrics.record_stats_verified();
                supplied.last_update_nanos = computed.last_update_nanos;
                if supplied != computed {
                    let diff = supplied.diff(&computed).join(", ");
                    log::error!(
                        "fast-path stats for {} disagree with a full scan: {}",
                        span,
                        diff
                    );
                    return Err(IngestError::InternalConsistency(format!(
                        "fast-path stats computation gave wrong result: diff(fast, computed) = {}",
                        diff
                    )));
                }
            }
            computed
        }
    };
    drop(data_iter);

    let CollisionCheckResult {
        skipped,
        skipped_count,
    } = collisions.unwrap_or_default();
    if req.disallow_shadowing {
        stats.subtract(&skipped);
    }
    stats.contains_estimates = !req.disallow_shadowing;

    let columnar = ctx.projector.project(span, &req.data)?;

    ms.add(&stats);
    log::info!(
        "AddSSTable {} merged ({} bytes, {} duplicate entries skipped)",
        span,
        req.data.len(),
        skipped_count
    );

    Ok(EvalResult {
        replicated: ReplicatedResult {
            add_sstable: AddSstable::new(&req.data),
            columnar,
        },
        delta: stats,
        skipped_duplicates: skipped_count,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::engine::iterator::{IterOptions, StorageIterator};
    use crate::engine::memtable::MemTable;
    use crate::error::{ProjectionError, StorageError};
    use crate::eval::projection::{ColumnarProjector, Projection};
    use crate::types::VersionedKey;

    fn vk(key: &str, wall: i64) -> VersionedKey {
        VersionedKey::new(key.as_bytes().to_vec(), Timestamp::new(wall, 0))
    }

    fn table(entries: &[(&str, i64, &str)]) -> SortedTable {
        SortedTable::from_entries(entries.iter().map(|(k, ts, v)| (vk(k, *ts), v.as_bytes())))
            .unwrap()
    }

    fn span() -> KeyRange {
        KeyRange::new(b"/01".to_vec(), b"/10".to_vec())
    }

    fn header() -> Header {
        Header::at(Timestamp::new(1_000, 0))
    }

    struct Harness {
        committed: MemTable,
        projector: ColumnarProjector,
        config: Config,
        metrics: EvalMetrics,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                committed: MemTable::new(),
                projector: ColumnarProjector::default(),
                config: Config::default().with_verify_statistics(false),
                metrics: EvalMetrics::new(),
            }
        }

        fn eval(&self, req: &AddSstRequest, ms: &mut RangeStats) -> Result<EvalResult> {
            let ctx = EvalContext {
                reader: &self.committed,
                projector: &self.projector,
                config: &self.config,
                metrics: &self.metrics,
            };
            eval_add_sstable(&ctx, &header(), req, ms)
        }
    }

    fn scan_stats(t: &SortedTable) -> RangeStats {
        compute_stats(&mut t.iter().unwrap(), b"/01", b"/10", 1_000).unwrap()
    }

    #[test]
    fn test_plain_ingest_is_estimated() {
        let h = Harness::new();
        let t = table(&[("/02", 1, "a"), ("/05", 1, "b")]);
        let mut ms = RangeStats::default();
        let res = h.eval(&AddSstRequest::new(span(), t.clone()), &mut ms).unwrap();
        assert_eq!(res.delta.key_count, 2);
        assert!(res.delta.contains_estimates);
        assert_eq!(ms, res.delta);
        assert_eq!(res.replicated.add_sstable.crc32, t.checksum());
        assert_eq!(res.replicated.add_sstable.data.as_ref(), t.as_bytes());
    }

    #[test]
    fn test_out_of_range_merges_nothing() {
        let h = Harness::new();
        let t = table(&[("/15", 1, "x")]);
        let mut ms = RangeStats {
            key_count: 4,
            ..Default::default()
        };
        let before = ms;
        let err = h.eval(&AddSstRequest::new(span(), t), &mut ms).unwrap_err();
        assert!(matches!(err, IngestError::OutOfRange { .. }));
        assert_eq!(ms, before);
    }

    #[test]
    fn test_duplicate_is_subtracted_and_exact() {
        let mut h = Harness::new();
        h.committed.insert(vk("/05", 1), b"b".to_vec());
        let t = table(&[("/02", 1, "a"), ("/05", 1, "b")]);
        let mut ms = RangeStats::default();
        let res = h
            .eval(&AddSstRequest::new(span(), t.clone()).disallow_shadowing(), &mut ms)
            .unwrap();

        let only_new = table(&[("/02", 1, "a")]);
        let expected = scan_stats(&only_new);
        assert_eq!(res.delta, expected);
        assert_eq!(res.delta.key_count, 1);
        assert!(!res.delta.contains_estimates);
        assert_eq!(res.skipped_duplicates, 1);
    }

    #[test]
    fn test_shadowing_rejected() {
        let mut h = Harness::new();
        h.committed.insert(vk("/05", 1), b"b".to_vec());
        let t = table(&[("/05", 1, "different")]);
        let mut ms = RangeStats::default();
        let err = h
            .eval(&AddSstRequest::new(span(), t).disallow_shadowing(), &mut ms)
            .unwrap_err();
        assert!(matches!(err, IngestError::ShadowedKey { .. }));
        assert_eq!(ms, RangeStats::default());
    }

    #[test]
    fn test_supplied_stats_trusted_without_verification() {
        let h = Harness::new();
        let t = table(&[("/02", 1, "a")]);
        let bogus = RangeStats {
            key_count: 42,
            ..Default::default()
        };
        let mut ms = RangeStats::default();
        let res = h
            .eval(&AddSstRequest::new(span(), t).with_stats(bogus), &mut ms)
            .unwrap();
        assert_eq!(res.delta.key_count, 42);
        assert!(res.delta.contains_estimates);
        assert_eq!(h.metrics.snapshot().stats_trusted, 1);
        assert_eq!(h.metrics.snapshot().stats_computed, 0);
    }

    #[test]
    fn test_verified_stats_match() {
        let mut h = Harness::new();
        h.config = h.config.clone().with_verify_statistics(true);
        let t = table(&[("/02", 1, "a"), ("/03", 4, "bc")]);
        let mut supplied = scan_stats(&t);
        supplied.last_update_nanos = 5;
        let mut ms = RangeStats::default();
        let res = h
            .eval(
                &AddSstRequest::new(span(), t.clone())
                    .with_stats(supplied)
                    .disallow_shadowing(),
                &mut ms,
            )
            .unwrap();
        assert_eq!(res.delta, scan_stats(&t));
        assert_eq!(h.metrics.snapshot().stats_verified, 1);
    }

    #[test]
    fn test_verified_stats_mismatch_is_fatal() {
        let mut h = Harness::new();
        h.config = h.config.clone().with_verify_statistics(true);
        let t = table(&[("/02", 1, "a")]);
        let mut supplied = scan_stats(&t);
        supplied.live_bytes += 1;
        let mut ms = RangeStats::default();
        let err = h
            .eval(
                &AddSstRequest::new(span(), t)
                    .with_stats(supplied)
                    .disallow_shadowing(),
                &mut ms,
            )
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("live_bytes"));
        assert_eq!(ms, RangeStats::default());
    }

    struct FailingProjector;

    impl Projector for FailingProjector {
        fn project(
            &self,
            _: &KeyRange,
            _: &SortedTable,
        ) -> std::result::Result<Projection, ProjectionError> {
            Err(ProjectionError::Other("schema unavailable".into()))
        }
    }

    #[test]
    fn test_projection_failure_merges_nothing() {
        let committed = MemTable::new();
        let config = Config::default();
        let metrics = EvalMetrics::new();
        let ctx = EvalContext {
            reader: &committed,
            projector: &FailingProjector,
            config: &config,
            metrics: &metrics,
        };
        let mut ms = RangeStats::default();
        let req = AddSstRequest::new(span(), table(&[("/02", 1, "a")]));
        let err = eval_add_sstable(&ctx, &header(), &req, &mut ms).unwrap_err();
        assert!(matches!(err, IngestError::Projection(_)));
        assert_eq!(ms, RangeStats::default());
        assert_eq!(metrics.snapshot().projection_errors, 1);
    }

    struct BrokenReader;

    struct BrokenIter(VersionedKey);

    impl StorageIterator for BrokenIter {
        fn seek(&mut self, _: &VersionedKey) {}
        fn valid(&self) -> std::result::Result<bool, StorageError> {
            Err(StorageError::Unavailable("disk gone".into()))
        }
        fn key(&self) -> &VersionedKey {
            &self.0
        }
        fn value(&self) -> &[u8] {
            &[]
        }
        fn next(&mut self) {}
        fn close(&mut self) {}
    }

    impl Reader for BrokenReader {
        fn new_iterator(&self, _: IterOptions) -> Box<dyn StorageIterator + '_> {
            Box::new(BrokenIter(VersionedKey::min()))
        }
    }

    /// Committed data that records how many iterators were opened and closed.
    struct CountingReader {
        inner: MemTable,
        opened: Cell<u32>,
        closed: Rc<Cell<u32>>,
    }

    impl CountingReader {
        fn new(inner: MemTable) -> Self {
            Self {
                inner,
                opened: Cell::new(0),
                closed: Rc::new(Cell::new(0)),
            }
        }
    }

    struct CountingIter<'a> {
        inner: Box<dyn StorageIterator + 'a>,
        closed: Rc<Cell<u32>>,
    }

    impl StorageIterator for CountingIter<'_> {
        fn seek(&mut self, target: &VersionedKey) {
            self.inner.seek(target)
        }
        fn valid(&self) -> std::result::Result<bool, StorageError> {
            self.inner.valid()
        }
        fn key(&self) -> &VersionedKey {
            self.inner.key()
        }
        fn value(&self) -> &[u8] {
            self.inner.value()
        }
        fn next(&mut self) {
            self.inner.next()
        }
        fn close(&mut self) {
            self.closed.set(self.closed.get() + 1);
            self.inner.close();
        }
    }

    impl Reader for CountingReader {
        fn new_iterator(&self, opts: IterOptions) -> Box<dyn StorageIterator + '_> {
            self.opened.set(self.opened.get() + 1);
            Box::new(CountingIter {
                inner: self.inner.new_iterator(opts),
                closed: Rc::clone(&self.closed),
            })
        }
    }

    #[test]
    fn test_committed_iterators_closed_on_every_outcome() {
        let mut mem = MemTable::new();
        mem.insert(vk("/05", 1), b"b".to_vec());
        mem.insert(vk("/07", 1), b"c".to_vec());
        let reader = CountingReader::new(mem);
        let projector = ColumnarProjector::default();
        let config = Config::default().with_verify_statistics(true);
        let metrics = EvalMetrics::new();
        let ctx = EvalContext {
            reader: &reader,
            projector: &projector,
            config: &config,
            metrics: &metrics,
        };
        let mut ms = RangeStats::default();

        let shadowing = table(&[("/02", 1, "a"), ("/05", 1, "z")]);
        let req = AddSstRequest::new(span(), shadowing).disallow_shadowing();
        let err = eval_add_sstable(&ctx, &header(), &req, &mut ms).unwrap_err();
        assert!(matches!(err, IngestError::ShadowedKey { .. }));
        assert_eq!(reader.opened.get(), 1);
        assert_eq!(reader.closed.get(), 1);

        // Bounds fail before committed data is read.
        let escaping = table(&[("/02", 1, "a"), ("/15", 1, "x")]);
        let req = AddSstRequest::new(span(), escaping).disallow_shadowing();
        let err = eval_add_sstable(&ctx, &header(), &req, &mut ms).unwrap_err();
        assert!(matches!(err, IngestError::OutOfRange { .. }));
        assert_eq!(reader.opened.get(), 1);
        assert_eq!(reader.closed.get(), 1);

        let duplicate = table(&[("/03", 1, "a"), ("/05", 1, "b")]);
        let req = AddSstRequest::new(span(), duplicate).disallow_shadowing();
        let res = eval_add_sstable(&ctx, &header(), &req, &mut ms).unwrap();
        assert_eq!(res.skipped_duplicates, 1);
        assert_eq!(reader.opened.get(), 2);
        assert_eq!(reader.closed.get(), 2);
    }

    #[test]
    fn test_storage_error_names_phase() {
        let projector = ColumnarProjector::default();
        let config = Config::default();
        let metrics = EvalMetrics::new();
        let ctx = EvalContext {
            reader: &BrokenReader,
            projector: &projector,
            config: &config,
            metrics: &metrics,
        };
        let mut ms = RangeStats::default();
        let req = AddSstRequest::new(span(), table(&[("/02", 1, "a")])).disallow_shadowing();
        let err = eval_add_sstable(&ctx, &header(), &req, &mut ms).unwrap_err();
        assert!(matches!(
            err,
            IngestError::StorageRead {
                phase: EvalPhase::CollisionCheck,
                ..
            }
        ));
        assert_eq!(ms, RangeStats::default());
    }

    #[test]
    fn test_corrupt_table_rejected() {
        let h = Harness::new();
        let mut raw = table(&[("/02", 1, "a")]).as_bytes().to_vec();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        let req = AddSstRequest::new(span(), SortedTable::from_bytes(raw));
        let mut ms = RangeStats::default();
        assert!(matches!(
            h.eval(&req, &mut ms),
            Err(IngestError::Corruption(_))
        ));
    }
}
