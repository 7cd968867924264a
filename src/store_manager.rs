//! StoreManager - owner of one store's shared state
//!
//! # Architecture
//!
//! - `SegmentStore` over the data directory (segments, cubes, pointers)
//! - `SearcherCache` (count-bounded) over a shared `FieldCache` (byte-bounded)
//! - `MergeEngine` with its in-progress guard set
//! - `SchemaProvider` for tables and links
//! - optional rayon pool for per-shard fan-out
//!
//! Every request-scoped operation goes through here, so two managers over
//! different directories share nothing.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use olapcube::{MemorySchemaProvider, SearchRequest, StoreConfig, StoreManager};
//!
//! let schema = Arc::new(MemorySchemaProvider::new());
//! let manager = StoreManager::open(StoreConfig::new("/data"), schema).unwrap();
//! let result = manager.search("shop", "orders", &SearchRequest::new("paid = true")).unwrap();
//! println!("{} matches", result.total);
//! ```

use std::sync::Arc;

use crate::aggregate::{AggregationRequestData, AggregationResult, OlapAggregate, PreparedPart};
use crate::cache::{FieldCache, SearcherCache};
use crate::config::StoreConfig;
use crate::error::Result;
use crate::fanout::{build_pool, for_each_shard, with_retry};
use crate::merge::{MergeEngine, MergeOptions, MergeOutcome};
use crate::query::{parse_query, Query};
use crate::schema::{Application, SchemaProvider};
use crate::search::{merge_results, search_cube, SearchPlan, SearchRequest, SearchResult};
use crate::searcher::SharedFieldCache;
use crate::storage::{SegmentName, SegmentStore};
use crate::types::SegmentBatch;
use crate::xlink::XLinkContext;

pub struct StoreManager {
    config: StoreConfig,
    store: Arc<SegmentStore>,
    field_cache: SharedFieldCache,
    searchers: SearcherCache,
    merges: MergeEngine,
    schema: Arc<dyn SchemaProvider>,
    pool: Option<rayon::ThreadPool>,
}

impl StoreManager {
    /// Open a manager over `config.data_dir`.
    pub fn open(config: StoreConfig, schema: Arc<dyn SchemaProvider>) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(SegmentStore::open_fs(&config.data_dir));
        Self::with_store(config, store, schema)
    }

    /// Build a manager around an existing segment store.
    pub fn with_store(
        config: StoreConfig,
        store: Arc<SegmentStore>,
        schema: Arc<dyn SchemaProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let field_cache: SharedFieldCache = Arc::new(FieldCache::new(config.field_cache_budget()));
        let searchers = SearcherCache::new(
            Arc::clone(&store),
            Arc::clone(&field_cache),
            config.searcher_capacity(),
        );
        let pool = build_pool(config.search_threads)?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            searchers = searchers.capacity(),
            field_cache_bytes = field_cache.max_bytes(),
            search_threads = config.search_threads,
            "store manager opened"
        );

        Ok(Self {
            merges: MergeEngine::new(Arc::clone(&store)),
            config,
            store,
            field_cache,
            searchers,
            schema,
            pool,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SegmentStore> {
        &self.store
    }

    pub fn searchers(&self) -> &SearcherCache {
        &self.searchers
    }

    pub fn field_cache(&self) -> &SharedFieldCache {
        &self.field_cache
    }

    pub fn merges(&self) -> &MergeEngine {
        &self.merges
    }

    // ── Segments ───────────────────────────────────────────────────

    /// Write a batch as a new segment. `overwrite = false` writes a
    /// `.before.` segment whose adds never replace existing documents.
    pub fn add_segment(&self, app: &str, shard: &str, batch: &SegmentBatch, overwrite: bool) -> Result<String> {
        self.store.add_segment(app, shard, batch, overwrite)
    }

    pub fn list_segments(&self, app: &str, shard: &str) -> Result<Vec<SegmentName>> {
        self.store.list_segments(app, shard)
    }

    pub fn list_shards(&self, app: &str) -> Result<Vec<String>> {
        self.store.list_shards(app)
    }

    pub fn delete_shard(&self, app: &str, shard: &str) -> Result<()> {
        self.store.delete_shard(app, shard)?;
        self.searchers.invalidate(app, shard, None);
        tracing::info!(app, shard, "shard deleted");
        Ok(())
    }

    pub fn delete_segment(&self, app: &str, shard: &str, segment: &str) -> Result<()> {
        self.store.delete_segment(app, shard, segment)?;
        self.searchers.invalidate(app, shard, Some(segment));
        tracing::info!(app, shard, segment, "segment deleted");
        Ok(())
    }

    pub fn cube_pointer(&self, app: &str, shard: &str) -> Result<Option<String>> {
        self.store.cube_pointer(app, shard)
    }

    // ── Merge ──────────────────────────────────────────────────────

    /// Merge a shard. Searchers of reclaimed inputs are dropped afterwards.
    pub fn merge(&self, app: &str, shard: &str, options: &MergeOptions) -> Result<MergeOutcome> {
        let outcome = self.merges.merge(app, shard, options)?;
        if let MergeOutcome::Merged(report) = &outcome {
            for segment in &report.merged_segments {
                self.searchers.invalidate(app, shard, Some(segment));
            }
        }
        Ok(outcome)
    }

    // ── Search ─────────────────────────────────────────────────────

    pub fn search(&self, app: &str, table: &str, request: &SearchRequest) -> Result<SearchResult> {
        let application = self.table_owner(app, table)?;
        let plan = SearchPlan::build(table, request, &self.store.list_shards(app)?)?;
        let expr = parse_query(&plan.query)?;

        let query = with_retry(self.config.search_attempts, "xlink pre-pass", || {
            let ctx = self.xlink_context(&application, &plan.x_shards, expr.has_links())?;
            ctx.resolve(table, &expr)
        })?;
        tracing::debug!(app, table, query = %expr, shards = plan.shards.len(), "search planned");

        let partials = for_each_shard(self.pool.as_ref(), &plan.shards, |shard| {
            with_retry(self.config.search_attempts, "shard search", || {
                let cube = self.searchers.current(app, shard)?;
                search_cube(&cube, &plan, &query)
            })
        })?;
        Ok(merge_results(&plan, partials))
    }

    // ── Aggregate ──────────────────────────────────────────────────

    pub fn aggregate(&self, app: &str, table: &str, request: &OlapAggregate) -> Result<AggregationResult> {
        let application = self.table_owner(app, table)?;
        let data = AggregationRequestData::build(table, request, &self.store.list_shards(app)?)?;

        let mut prepared = Vec::with_capacity(data.parts.len());
        for part in &data.parts {
            let linked = data.needs_xlink(part);
            prepared.push(with_retry(self.config.search_attempts, "xlink pre-pass", || {
                let ctx = self.xlink_context(&application, &data.x_shards, linked)?;
                PreparedPart::prepare(&ctx, &data, part)
            })?);
        }
        tracing::debug!(
            app,
            table,
            parts = prepared.len(),
            shards = data.shards.len(),
            "aggregation planned"
        );

        let partials = for_each_shard(self.pool.as_ref(), &data.shards, |shard| {
            with_retry(self.config.search_attempts, "shard aggregation", || {
                let cube = self.searchers.current(app, shard)?;
                let mut partial = AggregationResult::empty(&request.group_by, &data.metrics);
                for part in &prepared {
                    partial.merge(part.aggregate(&cube, table, &data.metrics)?);
                }
                Ok(partial)
            })
        })?;

        let mut result = AggregationResult::empty(&request.group_by, &data.metrics);
        for partial in partials {
            result.merge(partial);
        }
        Ok(result)
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn table_owner(&self, app: &str, table: &str) -> Result<Arc<Application>> {
        let application = self.schema.application(app)?;
        application.table(table)?;
        Ok(application)
    }

    /// X-shard cubes are only resolved when the request reaches across
    /// shards.
    fn xlink_context(&self, app: &Arc<Application>, x_shards: &[String], linked: bool) -> Result<XLinkContext> {
        if linked {
            XLinkContext::open(&self.searchers, Arc::clone(app), x_shards)
        } else {
            Ok(XLinkContext::new(Arc::clone(app), Vec::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OlapError;
    use crate::schema::{MemorySchemaProvider, TableSchema};
    use crate::types::Document;
    use tempfile::tempdir;

    fn manager(dir: &std::path::Path) -> StoreManager {
        let schema = MemorySchemaProvider::new();
        schema
            .register(Application::new("app").with_table("t", TableSchema::new()))
            .unwrap();
        let config = StoreConfig::new(dir).with_field_cache_bytes(1 << 20);
        StoreManager::open(config, Arc::new(schema)).unwrap()
    }

    fn batch(ids: &[&str]) -> SegmentBatch {
        SegmentBatch::new().add("t", ids.iter().map(|id| Document::new(*id).with("v", 1i64)))
    }

    #[test]
    fn test_search_after_merge() {
        let dir = tempdir().unwrap();
        let m = manager(dir.path());
        m.add_segment("app", "s1", &batch(&["a", "b"]), true).unwrap();
        m.merge("app", "s1", &MergeOptions::default()).unwrap();

        let result = m.search("app", "t", &SearchRequest::new("*")).unwrap();
        assert_eq!(result.ids(), vec!["a", "b"]);
        assert_eq!(result.total, 2);
    }

    #[test]
    fn test_unmerged_shard_is_cube_not_found() {
        let dir = tempdir().unwrap();
        let m = manager(dir.path());
        m.add_segment("app", "s1", &batch(&["a"]), true).unwrap();
        let err = m.search("app", "t", &SearchRequest::new("*")).unwrap_err();
        assert!(matches!(err, OlapError::CubeNotFound { .. }));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_unknown_table_and_app() {
        let dir = tempdir().unwrap();
        let m = manager(dir.path());
        assert!(matches!(
            m.search("app", "nope", &SearchRequest::new("*")),
            Err(OlapError::TableNotFound { .. })
        ));
        assert!(matches!(
            m.aggregate("other", "t", &OlapAggregate::new("*")),
            Err(OlapError::ApplicationNotFound(_))
        ));
    }

    #[test]
    fn test_delete_segment_drops_cached_searcher() {
        let dir = tempdir().unwrap();
        let m = manager(dir.path());
        m.add_segment("app", "s1", &batch(&["a"]), true).unwrap();
        m.merge("app", "s1", &MergeOptions::default()).unwrap();
        m.search("app", "t", &SearchRequest::new("*")).unwrap();

        let cube = m.cube_pointer("app", "s1").unwrap().unwrap();
        assert!(m.searchers().contains("app", "s1", &cube));
        m.delete_segment("app", "s1", &cube).unwrap();
        assert!(!m.searchers().contains("app", "s1", &cube));
    }

    #[test]
    fn test_aggregate_without_groups_counts_all() {
        let dir = tempdir().unwrap();
        let m = manager(dir.path());
        for shard in ["s1", "s2"] {
            m.add_segment("app", shard, &batch(&["a", "b", "c"]), true).unwrap();
            m.merge("app", shard, &MergeOptions::default()).unwrap();
        }
        let result = m.aggregate("app", "t", &OlapAggregate::new("*").metric("sum(v)")).unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].value(0), Some(6.0));
    }
}
