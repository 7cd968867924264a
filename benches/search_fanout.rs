//! Search and aggregation fan-out benchmark.
//!
//! Measures per-request latency over merged cubes with a warm field cache,
//! sequential versus pooled fan-out, and the cost of an XLink pre-pass.
//!
//! Run: cargo bench --bench search_fanout

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use olapcube::{
    Application, Document, FieldKind, MemorySchemaProvider, MergeOptions, OlapAggregate,
    SearchRequest, SegmentBatch, ShardSelector, StoreConfig, StoreManager, TableSchema,
};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const SHARDS: usize = 8;
const ORDERS_PER_SHARD: usize = 5_000;
const CUSTOMERS: usize = 1_000;

fn schema() -> MemorySchemaProvider {
    let provider = MemorySchemaProvider::new();
    provider
        .register(
            Application::new("shop")
                .with_table("customers", TableSchema::new())
                .with_table(
                    "orders",
                    TableSchema::new().with_field("customer", FieldKind::Link { table: "customers".into() }),
                ),
        )
        .unwrap();
    provider
}

fn order_shards() -> ShardSelector {
    ShardSelector::Range {
        start: "orders-00".into(),
        end: "orders-99".into(),
    }
}

/// `SHARDS` order shards plus one customer shard, all merged.
fn create_store(threads: usize) -> (TempDir, StoreManager) {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::new(dir.path())
        .with_field_cache_bytes(256 << 20)
        .with_search_threads(threads);
    let manager = StoreManager::open(config, Arc::new(schema())).unwrap();

    let customers = (0..CUSTOMERS).map(|i| {
        Document::new(format!("c{i:05}")).with("city", format!("city-{}", i % 20))
    });
    manager
        .add_segment("shop", "customers", &SegmentBatch::new().add("customers", customers), true)
        .unwrap();
    manager.merge("shop", "customers", &MergeOptions::default()).unwrap();

    for s in 0..SHARDS {
        let shard = format!("orders-{s:02}");
        let orders = (0..ORDERS_PER_SHARD).map(|i| {
            let n = s * ORDERS_PER_SHARD + i;
            Document::new(format!("o{n:07}"))
                .with("customer", format!("c{:05}", n % CUSTOMERS))
                .with("total", (n % 500) as f64)
                .with("status", if n % 3 == 0 { "open" } else { "closed" })
        });
        manager
            .add_segment("shop", &shard, &SegmentBatch::new().add("orders", orders), true)
            .unwrap();
        manager.merge("shop", &shard, &MergeOptions::default()).unwrap();
    }
    (dir, manager)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    group.sample_size(20);

    for threads in [0usize, 4] {
        let (_dir, manager) = create_store(threads);
        let request = SearchRequest::new("status = open AND total >= 250")
            .order("-total")
            .page(100, 50)
            .shards(order_shards());
        group.bench_with_input(BenchmarkId::new("top_page", threads), &request, |b, request| {
            b.iter(|| black_box(manager.search("shop", "orders", request).unwrap()))
        });
    }
    group.finish();
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");
    group.sample_size(10);

    let (_dir, manager) = create_store(4);
    let local = OlapAggregate::new("*")
        .group_by("status")
        .metric("sum(total)")
        .shards(order_shards());
    group.bench_function("local_groups", |b| {
        b.iter(|| black_box(manager.aggregate("shop", "orders", &local).unwrap()))
    });

    let linked = OlapAggregate::new("*")
        .group_by("customer.city")
        .metric("avg(total)")
        .shards(order_shards())
        .x_shards(ShardSelector::List(vec!["customers".into()]));
    group.bench_function("xlink_groups", |b| {
        b.iter(|| black_box(manager.aggregate("shop", "orders", &linked).unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_search, bench_aggregate);
criterion_main!(benches);
