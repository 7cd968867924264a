//! Integration test: cross-shard links through search and aggregate.
//!
//! Customers live in shard `people`; their orders are split over the month
//! shards `2024-01` and `2024-02`; products live in `catalog`.

use std::sync::Arc;

use olapcube::{
    Application, Document, FieldKind, MemorySchemaProvider, MergeOptions, OlapAggregate,
    SearchRequest, SegmentBatch, ShardSelector, StoreConfig, StoreManager, TableSchema,
};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn shop() -> Application {
    Application::new("shop")
        .with_table(
            "customers",
            TableSchema::new().with_field(
                "orders",
                FieldKind::InverseLink {
                    table: "orders".into(),
                    field: "customer".into(),
                },
            ),
        )
        .with_table(
            "orders",
            TableSchema::new()
                .with_field("customer", FieldKind::Link { table: "customers".into() })
                .with_field("product", FieldKind::Link { table: "products".into() }),
        )
        .with_table("products", TableSchema::new())
        .with_table("trades", TableSchema::new())
}

fn order(id: &str, customer: &str, product: &str, total: f64) -> Document {
    Document::new(id)
        .with("customer", customer)
        .with("product", product)
        .with("total", total)
}

fn list(shards: &[&str]) -> ShardSelector {
    ShardSelector::List(shards.iter().map(|s| s.to_string()).collect())
}

fn months() -> ShardSelector {
    ShardSelector::Range {
        start: "2024-01".into(),
        end: "2024-02".into(),
    }
}

struct Shop {
    _dir: TempDir,
    manager: StoreManager,
}

fn write(manager: &StoreManager, shard: &str, batch: SegmentBatch) {
    manager.add_segment("shop", shard, &batch, true).unwrap();
    manager.merge("shop", shard, &MergeOptions::default()).unwrap();
}

fn setup(search_threads: usize) -> Shop {
    let dir = TempDir::new().unwrap();
    let schema = MemorySchemaProvider::new();
    schema.register(shop()).unwrap();
    let config = StoreConfig::new(dir.path())
        .with_field_cache_bytes(8 << 20)
        .with_search_threads(search_threads);
    let manager = StoreManager::open(config, Arc::new(schema)).unwrap();

    write(
        &manager,
        "people",
        SegmentBatch::new().add(
            "customers",
            vec![
                Document::new("c1").with("city", "Paris"),
                Document::new("c2").with("city", "Oslo"),
                Document::new("c3").with("city", "Paris"),
            ],
        ),
    );
    write(
        &manager,
        "catalog",
        SegmentBatch::new().add(
            "products",
            vec![
                Document::new("p1").with("category", "books"),
                Document::new("p2").with("category", "games"),
            ],
        ),
    );
    write(
        &manager,
        "2024-01",
        SegmentBatch::new().add(
            "orders",
            vec![order("o1", "c1", "p1", 10.0), order("o2", "c2", "p2", 5.0)],
        ),
    );
    write(
        &manager,
        "2024-02",
        SegmentBatch::new().add(
            "orders",
            vec![order("o3", "c1", "p2", 20.0), order("o4", "c3", "p1", 1.0)],
        ),
    );
    write(
        &manager,
        "trading",
        SegmentBatch::new().add(
            "trades",
            vec![
                Document::new("t1").with("buyer", "c1").with("seller", "c2"),
                Document::new("t2").with("buyer", "c2").with("seller", "c1"),
                Document::new("t3").with("buyer", "c1").with("seller", "c3"),
                Document::new("t4").with("buyer", "c2").with("seller", "c3"),
            ],
        ),
    );

    Shop { _dir: dir, manager }
}

// ---------------------------------------------------------------------------
// Tests: Search
// ---------------------------------------------------------------------------

#[test]
fn search_with_direct_link_quantifier() {
    let shop = setup(0);
    let request = SearchRequest::new("ANY customer(city = Paris)")
        .shards(months())
        .x_shards(list(&["people"]));
    let result = shop.manager.search("shop", "orders", &request).unwrap();
    assert_eq!(result.ids(), vec!["o1", "o3", "o4"]);
}

#[test]
fn search_with_inverse_link_count() {
    let shop = setup(0);
    let request = SearchRequest::new("COUNT orders(total > 2) >= 1")
        .order("-city")
        .shards(list(&["people"]))
        .x_shards(months());
    let result = shop.manager.search("shop", "customers", &request).unwrap();
    // c3's only order totals 1.0.
    assert_eq!(result.ids(), vec!["c1", "c2"]);
}

#[test]
fn search_pair_matches_either_side() {
    let shop = setup(2);
    let request = SearchRequest::new("_pair.first = c3")
        .pair("buyer,seller")
        .shards(list(&["trading"]));
    let result = shop.manager.search("shop", "trades", &request).unwrap();
    assert_eq!(result.ids(), vec!["t3", "t4"]);
}

// ---------------------------------------------------------------------------
// Tests: Aggregate
// ---------------------------------------------------------------------------

#[test]
fn aggregate_groups_by_linked_field() {
    let shop = setup(2);
    let request = OlapAggregate::new("*")
        .group_by("customer.city")
        .metric("count")
        .metric("sum(total)")
        .shards(months())
        .x_shards(list(&["people"]));
    let result = shop.manager.aggregate("shop", "orders", &request).unwrap();

    assert_eq!(result.group_by, vec!["customer.city"]);
    assert_eq!(result.metrics, vec!["count", "sum(total)"]);
    assert_eq!(result.rows.len(), 2);
    let paris = result.row(&["Paris"]).unwrap();
    assert_eq!(paris.value(0), Some(3.0));
    assert_eq!(paris.value(1), Some(31.0));
    let oslo = result.row(&["Oslo"]).unwrap();
    assert_eq!(oslo.value(1), Some(5.0));
}

#[test]
fn aggregate_inverse_metric_with_x_filter() {
    let shop = setup(0);
    let request = OlapAggregate::new("*")
        .group_by("city")
        .metric("sum(orders.total)")
        .x_filter("orders", "product = p2")
        .shards(list(&["people"]))
        .x_shards(months());
    let result = shop.manager.aggregate("shop", "customers", &request).unwrap();

    // Only o2 (c2, 5.0) and o3 (c1, 20.0) reference p2.
    assert_eq!(result.row(&["Paris"]).unwrap().value(0), Some(20.0));
    assert_eq!(result.row(&["Oslo"]).unwrap().value(0), Some(5.0));
}

#[test]
fn aggregate_mixes_local_and_linked_groups() {
    let shop = setup(0);
    let request = OlapAggregate::new("total >= 5")
        .group_by("customer")
        .group_by("product.category")
        .shards(months())
        .x_shards(list(&["catalog"]));
    let result = shop.manager.aggregate("shop", "orders", &request).unwrap();

    let keys: Vec<Vec<String>> = result.rows.iter().map(|r| r.keys.clone()).collect();
    assert_eq!(
        keys,
        vec![
            vec!["c1".to_string(), "books".to_string()],
            vec!["c1".to_string(), "games".to_string()],
            vec!["c2".to_string(), "games".to_string()],
        ]
    );
}

#[test]
fn aggregate_pair_doubles_and_merges_parts() {
    let shop = setup(0);
    let request = OlapAggregate::new("_pair.first = c1")
        .group_by("_pair.second")
        .pair("buyer,seller")
        .shards(list(&["trading"]));
    let result = shop.manager.aggregate("shop", "trades", &request).unwrap();

    // buyer = c1 -> sellers c2, c3; seller = c1 -> buyer c2.
    assert_eq!(result.group_by, vec!["_pair.second"]);
    assert_eq!(result.row(&["c2"]).unwrap().value(0), Some(2.0));
    assert_eq!(result.row(&["c3"]).unwrap().value(0), Some(1.0));
}

#[test]
fn aggregate_bad_link_fails_before_any_scan() {
    let shop = setup(0);
    let request = OlapAggregate::new("*")
        .group_by("customer.city")
        .metric("sum(total.amount)")
        .shards(months())
        .x_shards(list(&["people"]));
    let err = shop.manager.aggregate("shop", "orders", &request).unwrap_err();

    assert!(matches!(err, olapcube::OlapError::NotALink { .. }), "got {:?}", err);
    assert_eq!(shop.manager.field_cache().stats().misses, 0);
}

#[test]
fn aggregate_rejects_both_shard_forms() {
    let err = ShardSelector::from_params(Some("a,b"), Some("a,b")).unwrap_err();
    assert!(matches!(err, olapcube::OlapError::InvalidShardSpec(_)));
}
