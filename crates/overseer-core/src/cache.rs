//! Result cache keyed by call signature
//!
//! Entries hold (value, expiry, hit count). Expired entries are evicted on
//! read rather than by a background sweeper; when the cache is full the entry
//! closest to expiry is evicted to make room.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_ENTRIES: usize = 1024;

#[derive(Debug)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
    hits: u64,
}

/// Counters for cache effectiveness
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// TTL cache for task results.
pub struct ResultCache {
    inner: Mutex<CacheInner>,
    max_entries: usize,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl ResultCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            max_entries: max_entries.max(1),
        }
    }

    /// Canonical signature for a (kind, params) pair.
    ///
    /// serde_json maps serialize with sorted keys, so logically equal params
    /// produce the same signature regardless of construction order.
    pub fn signature(kind: &str, params: &Value) -> String {
        format!("{}:{}", kind, params)
    }

    /// Look up a live entry, evicting it if expired (eviction on read).
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();

        match inner.entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.hits += 1;
                let value = entry.value.clone();
                inner.hits += 1;
                Some(value)
            }
            Some(_) => {
                inner.entries.remove(key);
                inner.evictions += 1;
                inner.misses += 1;
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Store a value under `key` for `ttl`.
    pub fn insert(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        let key = key.into();
        let mut inner = self.inner.lock().unwrap();

        if inner.entries.len() >= self.max_entries && !inner.entries.contains_key(&key) {
            // Full: make room by dropping the entry closest to expiry.
            if let Some(victim) = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&victim);
                inner.evictions += 1;
            }
        }

        inner.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
                hits: 0,
            },
        );
    }

    /// Hit count for a live entry, if present.
    pub fn hit_count(&self, key: &str) -> Option<u64> {
        let inner = self.inner.lock().unwrap();
        inner.entries.get(key).map(|entry| entry.hits)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        CacheStats {
            entries: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }
}
