//! Bounded in-memory memo caches owned by a volume.
//!
//! Each cache counts its own hits and misses; there is no process-wide
//! state, so dropping the owning volume drops the cache and its counters.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use log::trace;
use lru::LruCache;

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

/// A least-recently-used map holding at most `capacity` entries.
///
/// A zero capacity disables caching; every lookup then counts as a miss.
/// A poisoned lock degrades to "not cached" rather than failing the caller.
#[derive(Debug)]
pub struct MemoCache<K: Hash + Eq, V> {
    entries: Option<Mutex<LruCache<K, V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K: Eq + Hash, V: Clone> MemoCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let found = self
            .entries
            .as_ref()
            .and_then(|entries| entries.lock().ok())
            .and_then(|mut entries| entries.get(key).cloned());
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn insert(&self, key: K, value: V) {
        let Some(entries) = &self.entries else {
            return;
        };
        if let Ok(mut entries) = entries.lock() {
            if entries.len() == entries.cap().get() && !entries.contains(&key) {
                trace!("memo cache full ({} entries), evicting the oldest", entries.len());
            }
            entries.put(key, value);
        }
    }

    pub fn clear(&self) {
        if let Some(Ok(mut entries)) = self.entries.as_ref().map(|e| e.lock()) {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .as_ref()
            .and_then(|entries| entries.lock().ok().map(|e| e.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.len(),
        }
    }
}
