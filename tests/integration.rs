//! RANGEINGEST - Integration Tests
//! End-to-end tests of the evaluation lifecycle:
//! write committed data → evaluate ingestion → apply → compare statistics
//! against a from-scratch recomputation.

use rangeingest::config::Config;
use rangeingest::engine::sstable::{SortedTable, SortedTableWriter};
use rangeingest::engine::stats::{compute_stats, RangeStats};
use rangeingest::engine::Replica;
use rangeingest::error::IngestError;
use rangeingest::eval::projection::{ColumnarBatch, ColumnarProjector};
use rangeingest::eval::result::ReplicatedResult;
use rangeingest::eval::{AddSstRequest, Header};
use rangeingest::types::{KeyRange, Timestamp, VersionedKey};

mod common {
    use super::*;

    pub const NOW: i64 = 1_000;

    pub fn vk(key: &str, wall: i64) -> VersionedKey {
        VersionedKey::new(key.as_bytes().to_vec(), Timestamp::new(wall, 0))
    }

    pub fn span() -> KeyRange {
        KeyRange::new(b"/01".to_vec(), b"/10".to_vec())
    }

    pub fn header() -> Header {
        Header::at(Timestamp::new(NOW, 0))
    }

    /// Replica over `/01../10` with verification forced on.
    pub fn replica(existing: &[(&str, i64, &str)]) -> Replica {
        let mut replica = Replica::new(span(), Config::default().with_verify_statistics(true));
        for (k, ts, v) in existing {
            replica.put(vk(k, *ts), v.as_bytes().to_vec(), NOW).unwrap();
        }
        replica
    }

    pub fn table(entries: &[(&str, i64, &str)]) -> SortedTable {
        let mut w = SortedTableWriter::new();
        for (k, ts, v) in entries {
            w.add(vk(k, *ts), v.as_bytes()).unwrap();
        }
        w.finish()
    }

    pub fn table_stats(t: &SortedTable) -> RangeStats {
        compute_stats(&mut t.iter().unwrap(), b"/01", b"/10", NOW).unwrap()
    }
}

use common::*;

#[test]
fn test_scenario_plain_ingest_into_empty_range() {
    let mut r = replica(&[]);
    let req = AddSstRequest::new(span(), table(&[("/02", 1, "a"), ("/05", 1, "b")]));
    let res = r
        .evaluate(&header(), &req, &ColumnarProjector::default())
        .unwrap();

    assert_eq!(res.delta.key_count, 2);
    assert!(res.delta.contains_estimates);
    assert_eq!(r.stats().key_count, 2);
}

#[test]
fn test_scenario_exact_duplicate_with_shadowing_disallowed() {
    let mut r = replica(&[("/05", 1, "b")]);
    let before = *r.stats();
    let t = table(&[("/02", 1, "a"), ("/05", 1, "b")]);
    let req = AddSstRequest::new(span(), t.clone()).disallow_shadowing();
    let res = r
        .evaluate(&header(), &req, &ColumnarProjector::default())
        .unwrap();

    let dup_only = table_stats(&table(&[("/05", 1, "b")]));
    let expected = table_stats(&t) - dup_only;
    assert_eq!(res.delta, expected);
    assert_eq!(res.delta.key_count, 1);
    assert!(!res.delta.contains_estimates);

    // Net zero for /05: the range now holds exactly two keys.
    r.apply(&res.replicated).unwrap();
    assert_eq!(r.stats().key_count, before.key_count + 1);
    assert_eq!(*r.stats(), r.compute_stats_from_scratch(NOW).unwrap());
}

#[test]
fn test_scenario_key_past_end_is_out_of_range() {
    let mut r = replica(&[]);
    let req = AddSstRequest::new(span(), table(&[("/15", 1, "x")]));
    let err = r
        .evaluate(&header(), &req, &ColumnarProjector::default())
        .unwrap_err();
    assert!(matches!(err, IngestError::OutOfRange { .. }));
}

#[test]
fn test_bounds_failures_merge_nothing() {
    let mut r = replica(&[("/03", 1, "c")]);
    let before = *r.stats();
    for entries in [
        vec![("/00", 1, "x"), ("/02", 1, "y")],
        vec![("/02", 1, "y"), ("/09", 1, "z"), ("/99", 1, "w")],
    ] {
        for noshadow in [false, true] {
            let mut req = AddSstRequest::new(span(), table(&entries));
            req.disallow_shadowing = noshadow;
            let err = r
                .evaluate(&header(), &req, &ColumnarProjector::default())
                .unwrap_err();
            assert!(matches!(err, IngestError::OutOfRange { .. }));
            assert_eq!(*r.stats(), before);
        }
    }
    assert_eq!(r.metrics().snapshot().out_of_range, 4);
}

#[test]
fn test_additive_delta_matches_recomputation() {
    let existing = [("/01", 3, "x"), ("/04", 8, "y"), ("/04", 2, "old"), ("/08", 1, "")];
    let mut r = replica(&existing);
    let t = table(&[("/02", 5, "a"), ("/03", 5, ""), ("/03", 2, "gone"), ("/06", 1, "bb")]);
    let req = AddSstRequest::new(span(), t).disallow_shadowing();
    let res = r
        .evaluate(&header(), &req, &ColumnarProjector::default())
        .unwrap();
    r.apply(&res.replicated).unwrap();

    assert!(!r.stats().contains_estimates);
    assert_eq!(*r.stats(), r.compute_stats_from_scratch(NOW).unwrap());
}

#[test]
fn test_shadowing_rejected_and_stats_untouched() {
    let mut r = replica(&[("/05", 1, "b")]);
    let before = *r.stats();
    let req =
        AddSstRequest::new(span(), table(&[("/02", 1, "a"), ("/05", 1, "z")])).disallow_shadowing();
    let err = r
        .evaluate(&header(), &req, &ColumnarProjector::default())
        .unwrap_err();
    assert!(matches!(err, IngestError::ShadowedKey { .. }));
    assert_eq!(*r.stats(), before);
    assert_eq!(r.metrics().snapshot().shadow_rejections, 1);
}

#[test]
fn test_shadowing_allowed_marks_estimate() {
    let mut r = replica(&[("/05", 1, "b")]);
    let req = AddSstRequest::new(span(), table(&[("/05", 1, "z")]));
    let res = r
        .evaluate(&header(), &req, &ColumnarProjector::default())
        .unwrap();
    r.apply(&res.replicated).unwrap();

    // The overwrite was double counted; the flag says so until recomputed.
    assert!(r.stats().contains_estimates);
    assert_eq!(r.stats().key_count, 2);
    let correction = r.recompute_stats(NOW).unwrap();
    assert_eq!(correction.key_count, -1);
    assert!(!r.stats().contains_estimates);
    assert_eq!(r.stats().key_count, 1);
}

#[test]
fn test_estimate_flag_sticks_until_recompute() {
    let mut r = replica(&[]);
    let plain = AddSstRequest::new(span(), table(&[("/02", 1, "a")]));
    r.evaluate(&header(), &plain, &ColumnarProjector::default())
        .unwrap();
    assert!(r.stats().contains_estimates);

    let exact = AddSstRequest::new(span(), table(&[("/03", 1, "b")])).disallow_shadowing();
    let res = r
        .evaluate(&header(), &exact, &ColumnarProjector::default())
        .unwrap();
    assert!(!res.delta.contains_estimates);
    assert!(r.stats().contains_estimates);
}

#[test]
fn test_fast_path_equivalence_under_verification() {
    let t = table(&[("/02", 7, "a"), ("/02", 3, "b"), ("/04", 1, ""), ("/07", 2, "ccc")]);
    let mut supplied = table_stats(&t);
    supplied.last_update_nanos = 0;

    let mut r = replica(&[("/03", 1, "x")]);
    let req = AddSstRequest::new(span(), t.clone())
        .with_stats(supplied)
        .disallow_shadowing();
    let res = r
        .evaluate(&header(), &req, &ColumnarProjector::default())
        .unwrap();
    assert_eq!(res.delta, table_stats(&t));
    let m = r.metrics().snapshot();
    assert_eq!(m.stats_verified, 1);
    assert_eq!(m.stats_trusted, 0);
}

#[test]
fn test_fast_path_divergence_is_fatal() {
    let t = table(&[("/02", 7, "a")]);
    let mut supplied = table_stats(&t);
    supplied.key_count += 1;

    let mut r = replica(&[]);
    let before = *r.stats();
    let req = AddSstRequest::new(span(), t).with_stats(supplied).disallow_shadowing();
    let err = r
        .evaluate(&header(), &req, &ColumnarProjector::default())
        .unwrap_err();
    assert!(matches!(err, IngestError::InternalConsistency(_)));
    assert!(err.is_fatal());
    assert_eq!(*r.stats(), before);
}

#[test]
fn test_fast_path_trusted_when_verification_off() {
    let t = table(&[("/02", 7, "a")]);
    let supplied = table_stats(&t);
    let mut r = Replica::new(span(), Config::default().with_verify_statistics(false));
    let req = AddSstRequest::new(span(), t).with_stats(supplied).disallow_shadowing();
    let res = r
        .evaluate(&header(), &req, &ColumnarProjector::default())
        .unwrap();
    assert_eq!(res.delta, supplied);
    assert_eq!(r.metrics().snapshot().stats_computed, 0);
}

#[test]
fn test_replicas_produce_identical_results() {
    let existing = [("/03", 2, "c"), ("/06", 4, "f")];
    let t = table(&[("/02", 9, "a"), ("/03", 2, "c"), ("/07", 9, "g")]);
    let req = AddSstRequest::new(span(), t).disallow_shadowing();

    let mut encoded = Vec::new();
    let mut stats = Vec::new();
    for _ in 0..3 {
        let mut r = replica(&existing);
        let res = r
            .evaluate(&header(), &req, &ColumnarProjector::default())
            .unwrap();
        encoded.push(res.replicated.encode().unwrap());
        stats.push(*r.stats());
    }
    assert!(encoded.windows(2).all(|w| w[0] == w[1]));
    assert!(stats.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_replicated_result_survives_transport() {
    let mut leader = replica(&[]);
    let mut follower = replica(&[]);
    let t = table(&[("/02", 1, "a"), ("/05", 1, "b")]);
    let req = AddSstRequest::new(span(), t.clone());
    let res = leader
        .evaluate(&header(), &req, &ColumnarProjector::default())
        .unwrap();

    let wire = res.replicated.encode().unwrap();
    let received = ReplicatedResult::decode(&wire).unwrap();
    assert_eq!(received.add_sstable.crc32, t.checksum());
    follower.apply(&received).unwrap();
    leader.apply(&res.replicated).unwrap();
    assert_eq!(follower.data().scan(), leader.data().scan());

    let batch = ColumnarBatch::decode(&received.columnar.data).unwrap();
    assert_eq!(batch.len(), 2);
}

#[test]
fn test_ingest_table_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("batch.sst");
    let mut w = SortedTableWriter::new();
    w.add(vk("/02", 4), b"from-disk").unwrap();
    w.finish_to_file(&path).unwrap();

    let mut r = replica(&[]);
    let loaded = SortedTable::from_file(&path).unwrap();
    let req = AddSstRequest::new(span(), loaded).disallow_shadowing();
    let res = r
        .evaluate(&header(), &req, &ColumnarProjector::default())
        .unwrap();
    r.apply(&res.replicated).unwrap();
    assert_eq!(r.data().scan(), vec![(vk("/02", 4), b"from-disk".to_vec())]);
    assert_eq!(*r.stats(), r.compute_stats_from_scratch(NOW).unwrap());
}
