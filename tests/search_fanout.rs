//! Integration test: search fan-out under concurrent merges.
//!
//! Validates that:
//! - A search racing merges that reclaim its cube retries with a fresh
//!   pointer and never observes a torn or partial result
//! - Paging over many shards applies skip after the merge of partials
//! - Parallel and sequential fan-out return identical results
//! - A partially reclaimed cube is never searched as empty: it fails with
//!   `SegmentDeleted` until the pointer moves to a complete cube

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use olapcube::fanout::with_retry;
use olapcube::storage::columnar::{read_cube, write_cube, CubeContent};
use olapcube::{
    Application, Document, MemorySchemaProvider, MergeOptions, OlapError, SearchRequest,
    SegmentBatch, SegmentStore, ShardSelector, StoreConfig, StoreManager, TableSchema, Value,
};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn open(dir: &TempDir, threads: usize, attempts: u32) -> StoreManager {
    let schema = MemorySchemaProvider::new();
    schema
        .register(Application::new("app").with_table("events", TableSchema::new()))
        .unwrap();
    let mut config = StoreConfig::new(dir.path())
        .with_field_cache_bytes(16 << 20)
        .with_search_threads(threads);
    config.search_attempts = attempts;
    StoreManager::open(config, Arc::new(schema)).unwrap()
}

/// `per_shard` events in each shard; `rank` is unique across shards.
fn populate(manager: &StoreManager, shards: usize, per_shard: usize) {
    for s in 0..shards {
        let shard = format!("shard-{s:02}");
        let docs = (0..per_shard).map(|i| {
            let rank = (i * shards + s) as i64;
            Document::new(format!("e{rank:04}")).with("rank", rank)
        });
        manager
            .add_segment("app", &shard, &SegmentBatch::new().add("events", docs), true)
            .unwrap();
        manager.merge("app", &shard, &MergeOptions::default()).unwrap();
    }
}

fn ranks(manager: &StoreManager, request: &SearchRequest) -> Vec<i64> {
    manager
        .search("app", "events", request)
        .unwrap()
        .rows
        .iter()
        .map(|row| match row.fields.get("rank") {
            Some(Value::Int(n)) => *n,
            other => panic!("unexpected rank {:?}", other),
        })
        .collect()
}

/// Remove one table directory of the shard's current cube, leaving the
/// cube directory itself in place. Returns the cube's content beforehand.
fn tear_current_cube(dir: &TempDir, manager: &StoreManager, shard: &str) -> CubeContent {
    let cube = manager.cube_pointer("app", shard).unwrap().unwrap();
    let path = SegmentStore::segment_path("app", shard, &cube);
    let content = read_cube(manager.store().directory(), &path).unwrap();
    std::fs::remove_dir_all(dir.path().join(&path).join("events")).unwrap();
    assert!(dir.path().join(&path).is_dir());
    content
}

/// Publish `content` as a fresh cube the way a merge does.
fn publish_cube(manager: &StoreManager, shard: &str, content: &CubeContent) -> String {
    let store = manager.store();
    let cube = store.ids().next_cube();
    let path = store.begin_segment("app", shard, &cube).unwrap();
    write_cube(store.directory(), &path, content).unwrap();
    store.set_cube_pointer("app", shard, &cube).unwrap();
    store.mark_created("app", shard, &cube).unwrap();
    cube
}

fn one_shard(shard: &str) -> ShardSelector {
    ShardSelector::List(vec![shard.to_string()])
}

// ---------------------------------------------------------------------------
// Tests: Paging
// ---------------------------------------------------------------------------

#[test]
fn skip_is_applied_after_merging_shards() {
    let dir = TempDir::new().unwrap();
    let m = open(&dir, 0, 2);
    populate(&m, 4, 10);

    let request = SearchRequest::new("*").order("rank").page(5, 10);
    assert_eq!(ranks(&m, &request), (5..15).collect::<Vec<_>>());

    let request = SearchRequest::new("rank >= 30").order("-rank").page(2, 3);
    assert_eq!(ranks(&m, &request), vec![37, 36, 35]);
}

#[test]
fn id_cursor_pages_across_shards() {
    let dir = TempDir::new().unwrap();
    let m = open(&dir, 2, 2);
    populate(&m, 4, 10);

    let after = SearchRequest::new("*").continue_after("e0009").page(0, 5);
    let result = m.search("app", "events", &after).unwrap();
    assert_eq!(result.ids(), vec!["e0010", "e0011", "e0012", "e0013", "e0014"]);
    assert_eq!(result.total, 30);

    let at = SearchRequest::new("rank < 20").continue_at("e0010").page(0, 100);
    let result = m.search("app", "events", &at).unwrap();
    assert_eq!(result.rows.len(), 10);
    assert_eq!(result.ids()[0], "e0010");

    let ordered = SearchRequest::new("*").continue_at("e0010").order("rank");
    assert!(matches!(
        m.search("app", "events", &ordered),
        Err(OlapError::InvalidRequest(_))
    ));
}

#[test]
fn parallel_fan_out_matches_sequential() {
    let seq_dir = TempDir::new().unwrap();
    let par_dir = TempDir::new().unwrap();
    let seq = open(&seq_dir, 0, 2);
    let par = open(&par_dir, 4, 2);
    populate(&seq, 6, 25);
    populate(&par, 6, 25);

    let request = SearchRequest::new("rank < 100").order("-rank").page(10, 40);
    assert_eq!(ranks(&seq, &request), ranks(&par, &request));
    assert_eq!(
        seq.search("app", "events", &request).unwrap().total,
        par.search("app", "events", &request).unwrap().total
    );
}

// ---------------------------------------------------------------------------
// Tests: Merge Race
// ---------------------------------------------------------------------------

#[test]
fn search_survives_concurrent_merges() {
    let dir = TempDir::new().unwrap();
    // Forced merges back to back can reclaim a cube twice within one
    // search, so allow more attempts than the default.
    let m = Arc::new(open(&dir, 2, 8));
    populate(&m, 2, 50);
    let expected: Vec<i64> = (0..100).collect();

    let stop = Arc::new(AtomicBool::new(false));
    let merger = {
        let m = Arc::clone(&m);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut merges = 0;
            while !stop.load(Ordering::Relaxed) {
                for shard in ["shard-00", "shard-01"] {
                    m.merge("app", shard, &MergeOptions::forced()).unwrap();
                    merges += 1;
                }
                thread::sleep(std::time::Duration::from_millis(5));
            }
            merges
        })
    };

    let request = SearchRequest::new("*").order("rank").page(0, 1000);
    for _ in 0..50 {
        assert_eq!(ranks(&m, &request), expected);
    }
    stop.store(true, Ordering::Relaxed);
    let merges = merger.join().unwrap();
    assert!(merges > 0);
}

// ---------------------------------------------------------------------------
// Tests: Partial Reclaim
// ---------------------------------------------------------------------------

#[test]
fn half_deleted_cube_is_segment_deleted_not_empty() {
    let dir = TempDir::new().unwrap();
    let m = open(&dir, 0, 3);
    populate(&m, 1, 3);
    tear_current_cube(&dir, &m, "shard-00");

    let request = SearchRequest::new("*").shards(one_shard("shard-00"));
    let err = m.search("app", "events", &request).unwrap_err();
    assert!(matches!(err, OlapError::SegmentDeleted { .. }), "got {:?}", err);
}

#[test]
fn search_recovers_once_pointer_moves_past_torn_cube() {
    let dir = TempDir::new().unwrap();
    // One attempt per call, so each search sees exactly one pointer.
    let m = open(&dir, 0, 1);
    populate(&m, 1, 3);
    let content = tear_current_cube(&dir, &m, "shard-00");
    let request = SearchRequest::new("*").order("rank").shards(one_shard("shard-00"));

    let mut calls = 0;
    let result = with_retry(3, "shard search", || {
        calls += 1;
        let result = m.search("app", "events", &request);
        if calls == 1 {
            assert!(matches!(result, Err(OlapError::SegmentDeleted { .. })));
            // A merge lands between attempts.
            publish_cube(&m, "shard-00", &content);
        }
        result
    })
    .unwrap();

    assert_eq!(calls, 2);
    assert_eq!(result.total, 3);
    assert_eq!(result.ids(), vec!["e0000", "e0001", "e0002"]);
}
