//! Bounded caches shared across concurrent requests: a byte-bounded LRU of
//! decoded field payloads and a count-bounded LRU of open searchers.

pub mod field_cache;
pub mod searcher_cache;

pub use field_cache::{FieldCache, FieldCacheStats};
pub use searcher_cache::{SearcherCache, SearcherKey};
