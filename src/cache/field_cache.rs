//! Byte-bounded LRU for decoded field payloads.
//!
//! Shared by every open searcher. Capacity is a byte budget, not an entry
//! count: each insert carries the caller's size estimate, and the least
//! recently used entries are evicted until the total fits again.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::error::Result;

struct Inner<K: Hash + Eq, V> {
    lru: LruCache<K, (Arc<V>, usize)>,
    bytes: usize,
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub bytes: usize,
}

pub struct FieldCache<K: Hash + Eq, V> {
    inner: Mutex<Inner<K, V>>,
    max_bytes: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K: Hash + Eq + Clone, V> FieldCache<K, V> {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                lru: LruCache::unbounded(),
                bytes: 0,
            }),
            max_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Look up and promote an entry.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let found = self.inner.lock().lru.get(key).map(|(v, _)| Arc::clone(v));
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Insert an entry of `size` bytes, evicting LRU entries to stay within
    /// budget. Entries larger than the whole budget are not cached, and
    /// any older entry under the same key is dropped.
    pub fn insert(&self, key: K, value: Arc<V>, size: usize) {
        let mut inner = self.inner.lock();
        if size > self.max_bytes {
            tracing::debug!(size, max = self.max_bytes, "field payload exceeds cache budget");
            if let Some((_, old_size)) = inner.lru.pop(&key) {
                inner.bytes -= old_size;
            }
            return;
        }
        if let Some((_, (_, old_size))) = inner.lru.push(key, (value, size)) {
            inner.bytes -= old_size;
        }
        inner.bytes += size;
        while inner.bytes > self.max_bytes {
            match inner.lru.pop_lru() {
                Some((_, (_, evicted))) => inner.bytes -= evicted,
                None => break,
            }
        }
    }

    /// Return the cached payload or decode it with `load`, which yields the
    /// value and its byte size. Decoding happens outside the lock; two
    /// racing misses may both decode, the later insert wins.
    pub fn get_or_load<F>(&self, key: &K, load: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<(V, usize)>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }
        let (value, size) = load()?;
        let value = Arc::new(value);
        self.insert(key.clone(), Arc::clone(&value), size);
        Ok(value)
    }

    /// Drop every entry whose key matches.
    pub fn invalidate(&self, matches: impl Fn(&K) -> bool) {
        let mut inner = self.inner.lock();
        let doomed: Vec<K> = inner
            .lru
            .iter()
            .filter(|(k, _)| matches(k))
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            if let Some((_, size)) = inner.lru.pop(&key) {
                inner.bytes -= size;
            }
        }
    }

    pub fn stats(&self) -> FieldCacheStats {
        let inner = self.inner.lock();
        FieldCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: inner.lru.len(),
            bytes: inner.bytes,
        }
    }
}
