//! olapcube - shard-partitioned columnar OLAP store
//!
//! Writes land as immutable per-shard segments, a merge folds them into one
//! cube per shard, and searches/aggregations fan out over the shards' current
//! cubes. Links between tables may cross shards; they are resolved in a
//! pre-pass over the x-shards before the per-shard scan.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod fanout;
pub mod merge;
pub mod query;
pub mod resource;
pub mod schema;
pub mod search;
pub mod searcher;
pub mod storage;
pub mod store_manager;
pub mod types;
pub mod xlink;

pub use aggregate::{AggregationResult, AggregationRow, MetricKind, MetricSpec, MetricValue, OlapAggregate};
pub use config::StoreConfig;
pub use error::{OlapError, Result};
pub use merge::{MergeEngine, MergeOptions, MergeOutcome, MergeReport};
pub use query::{parse_query, Pair, QueryExpr, ShardSelector};
pub use schema::{Application, FieldKind, MemorySchemaProvider, SchemaProvider, TableSchema};
pub use search::{SearchRequest, SearchResult, SearchRow};
pub use searcher::CubeSearcher;
pub use storage::{SegmentName, SegmentStore};
pub use store_manager::StoreManager;
pub use types::{Document, SegmentBatch, Value};
