//! Bounded in-memory cache with per-entry time-to-live.
//!
//! Storage is a `moka::sync::Cache`, which bounds the number of entries with
//! LRU-style eviction. Expiry is decided here against the injected
//! [`Clock`](crate::clock::Clock) rather than by moka, so every entry can
//! carry its own TTL and tests can move time explicitly.
//!
//! An entry is expired when `now - timestamp > ttl`. Expired entries are
//! evicted lazily on access, or in bulk by [`TtlCache::sweep`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::sync::Cache as MokaCache;

use crate::clock::{EpochMillis, SharedClock};

use super::{CacheConfig, CacheStats};

/// A stored value with its write time and lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub data: V,
    pub timestamp: EpochMillis,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// Whether the entry has outlived its TTL at `now`.
    pub fn is_expired(&self, now: EpochMillis) -> bool {
        now - self.timestamp > self.ttl.as_millis() as i64
    }
}

/// TTL cache keyed by opaque strings (usually stringified query parameters).
pub struct TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    entries: MokaCache<String, CacheEntry<V>>,
    default_ttl: Duration,
    max_entries: u64,
    clock: SharedClock,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl<V> std::fmt::Debug for TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("default_ttl", &self.default_ttl)
            .field("max_entries", &self.max_entries)
            .field("entries", &self.entries.entry_count())
            .finish_non_exhaustive()
    }
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: CacheConfig, clock: SharedClock) -> Self {
        let entries = MokaCache::builder().max_capacity(config.max_entries).build();

        Self {
            entries,
            default_ttl: config.default_ttl,
            max_entries: config.max_entries,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Store `data` under `key`, replacing any previous entry.
    ///
    /// `ttl` defaults to the cache-wide default.
    pub fn set(&self, key: impl Into<String>, data: V, ttl: Option<Duration>) {
        let key = key.into();
        let entry = CacheEntry {
            data,
            timestamp: self.clock.now_ms(),
            ttl: ttl.unwrap_or(self.default_ttl),
        };
        tracing::trace!(key = %key, ttl_secs = entry.ttl.as_secs(), "Cache set");
        self.entries.insert(key, entry);
    }

    /// Fetch a live entry, evicting it if it has expired.
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_entry(key).map(|entry| entry.data)
    }

    /// Fetch a live entry with its metadata.
    pub fn get_entry(&self, key: &str) -> Option<CacheEntry<V>> {
        let Some(entry) = self.entries.get(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key, "Cache miss");
            return None;
        };

        if entry.is_expired(self.clock.now_ms()) {
            self.entries.invalidate(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key, "Cache entry expired");
            return None;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(key, "Cache hit");
        Some(entry)
    }

    /// Whether a live entry exists. Expired entries are evicted.
    pub fn has(&self, key: &str) -> bool {
        match self.entries.get(key) {
            Some(entry) if entry.is_expired(self.clock.now_ms()) => {
                self.entries.invalidate(key);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Remove one entry. Returns whether it existed.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
    }

    /// Evict every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_ms();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.as_ref().clone())
            .collect();

        for key in &expired {
            self.entries.invalidate(key);
        }
        self.entries.run_pending_tasks();

        if !expired.is_empty() {
            self.expirations.fetch_add(expired.len() as u64, Ordering::Relaxed);
            tracing::debug!(removed = expired.len(), "Cache sweep");
        }
        expired.len()
    }

    /// Number of stored entries, live or not yet swept.
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            entries: self.len(),
            max_entries: self.max_entries,
        }
    }
}
