//! Count-bounded LRU of open cube searchers.
//!
//! Keyed by `app/shard/segment`. A key names immutable content, so a
//! cached searcher for a superseded cube stays correct until its directory
//! is reclaimed. Construction on a miss happens under the cache lock.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::error::{OlapError, Result};
use crate::searcher::{CubeSearcher, SharedFieldCache};
use crate::storage::SegmentStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearcherKey {
    pub app: String,
    pub shard: String,
    pub segment: String,
}

impl SearcherKey {
    pub fn new(app: &str, shard: &str, segment: &str) -> Self {
        Self {
            app: app.to_string(),
            shard: shard.to_string(),
            segment: segment.to_string(),
        }
    }
}

pub struct SearcherCache {
    lru: Mutex<LruCache<SearcherKey, Arc<CubeSearcher>>>,
    store: Arc<SegmentStore>,
    field_cache: SharedFieldCache,
}

impl SearcherCache {
    pub fn new(store: Arc<SegmentStore>, field_cache: SharedFieldCache, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            lru: Mutex::new(LruCache::new(capacity)),
            store,
            field_cache,
        }
    }

    /// Cached searcher for a segment, opening one on a miss. Evicted
    /// searchers are simply dropped.
    pub fn get_or_open(&self, app: &str, shard: &str, segment: &str) -> Result<Arc<CubeSearcher>> {
        let key = SearcherKey::new(app, shard, segment);
        let mut lru = self.lru.lock();
        if let Some(hit) = lru.get(&key) {
            return Ok(Arc::clone(hit));
        }
        let searcher = Arc::new(CubeSearcher::open(
            Arc::clone(&self.store),
            Arc::clone(&self.field_cache),
            app,
            shard,
            segment,
        )?);
        if let Some((evicted, _)) = lru.push(key, Arc::clone(&searcher)) {
            tracing::debug!(
                app = %evicted.app,
                shard = %evicted.shard,
                segment = %evicted.segment,
                "evicted searcher"
            );
        }
        Ok(searcher)
    }

    /// Searcher for the shard's current cube. The pointer is read fresh on
    /// every call, so a retry after `SegmentDeleted` sees a newer cube.
    pub fn current(&self, app: &str, shard: &str) -> Result<Arc<CubeSearcher>> {
        match self.store.cube_pointer(app, shard)? {
            Some(segment) => self.get_or_open(app, shard, &segment),
            None => Err(OlapError::CubeNotFound {
                app: app.to_string(),
                shard: shard.to_string(),
            }),
        }
    }

    pub fn contains(&self, app: &str, shard: &str, segment: &str) -> bool {
        self.lru.lock().contains(&SearcherKey::new(app, shard, segment))
    }

    /// Drop cached searchers (and their field payloads) matching a shard,
    /// or one segment of it when `segment` is given.
    pub fn invalidate(&self, app: &str, shard: &str, segment: Option<&str>) {
        let matches = |a: &str, s: &str, seg: &str| {
            a == app && s == shard && segment.map_or(true, |target| target == seg)
        };
        {
            let mut lru = self.lru.lock();
            let doomed: Vec<SearcherKey> = lru
                .iter()
                .filter(|(k, _)| matches(&k.app, &k.shard, &k.segment))
                .map(|(k, _)| k.clone())
                .collect();
            for key in doomed {
                lru.pop(&key);
            }
        }
        self.field_cache
            .invalidate(|k| matches(&k.app, &k.shard, &k.segment));
    }

    pub fn len(&self) -> usize {
        self.lru.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lru.lock().cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FieldCache;
    use crate::storage::columnar::{write_cube, CubeContent};
    use crate::types::{Document, SegmentBatch};
    use tempfile::tempdir;

    fn make_cube(store: &SegmentStore, shard: &str, name: &str) {
        let mut content = CubeContent::default();
        content.apply_batch(
            &SegmentBatch::new().add("t", vec![Document::new("d").with("x", 1i64)]),
            true,
        );
        let path = store.begin_segment("app", shard, name).unwrap();
        write_cube(store.directory(), &path, &content).unwrap();
        store.mark_created("app", shard, name).unwrap();
    }

    fn setup(dir: &std::path::Path, capacity: usize) -> (Arc<SegmentStore>, SearcherCache) {
        let store = Arc::new(SegmentStore::open_fs(dir));
        let cache = SearcherCache::new(
            Arc::clone(&store),
            Arc::new(FieldCache::new(1 << 20)),
            capacity,
        );
        (store, cache)
    }

    #[test]
    fn test_hit_returns_same_searcher() {
        let dir = tempdir().unwrap();
        let (store, cache) = setup(dir.path(), 4);
        make_cube(&store, "s", ".cube.a");

        let first = cache.get_or_open("app", "s", ".cube.a").unwrap();
        let second = cache.get_or_open("app", "s", ".cube.a").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_capacity_evicts_lru() {
        let dir = tempdir().unwrap();
        let (store, cache) = setup(dir.path(), 2);
        for name in [".cube.a", ".cube.b", ".cube.c"] {
            make_cube(&store, "s", name);
            cache.get_or_open("app", "s", name).unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("app", "s", ".cube.a"));
        assert!(cache.contains("app", "s", ".cube.c"));
    }

    #[test]
    fn test_zero_capacity_becomes_one() {
        let dir = tempdir().unwrap();
        let (_, cache) = setup(dir.path(), 0);
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn test_miss_on_deleted_segment_is_not_cached() {
        let dir = tempdir().unwrap();
        let (store, cache) = setup(dir.path(), 4);
        make_cube(&store, "s", ".cube.a");
        assert!(cache.get_or_open("app", "s", ".cube.missing").is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_current_follows_pointer() {
        let dir = tempdir().unwrap();
        let (store, cache) = setup(dir.path(), 4);
        make_cube(&store, "s", ".cube.a");
        assert!(matches!(
            cache.current("app", "s"),
            Err(OlapError::CubeNotFound { .. })
        ));
        assert!(matches!(
            cache.current("app", "nope"),
            Err(OlapError::ShardNotFound { .. })
        ));

        store.set_cube_pointer("app", "s", ".cube.a").unwrap();
        assert_eq!(cache.current("app", "s").unwrap().segment(), ".cube.a");
    }

    #[test]
    fn test_invalidate_shard() {
        let dir = tempdir().unwrap();
        let (store, cache) = setup(dir.path(), 8);
        make_cube(&store, "s1", ".cube.a");
        make_cube(&store, "s2", ".cube.a");
        cache.get_or_open("app", "s1", ".cube.a").unwrap();
        cache.get_or_open("app", "s2", ".cube.a").unwrap();

        cache.invalidate("app", "s1", None);
        assert!(!cache.contains("app", "s1", ".cube.a"));
        assert!(cache.contains("app", "s2", ".cube.a"));
    }
}
