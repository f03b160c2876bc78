//! Per-feature store of query results.

use std::sync::Arc;

use moka::sync::Cache as MokaCache;

use crate::clock::{EpochMillis, SharedClock};

use super::policy::QueryPolicy;

/// A cached query result and when it was fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedQuery<T> {
    pub data: T,
    pub fetched_at: EpochMillis,
}

/// Query results keyed by query key.
///
/// Unlike [`TtlCache`](crate::cache::TtlCache), entries never expire on
/// their own; whether they are fresh is up to each query's [`QueryPolicy`].
pub struct QueryCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    entries: MokaCache<String, CachedQuery<T>>,
    clock: SharedClock,
}

impl<T> QueryCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(max_entries: u64, clock: SharedClock) -> Self {
        Self {
            entries: MokaCache::builder().max_capacity(max_entries).build(),
            clock,
        }
    }

    pub fn get(&self, key: &str) -> Option<CachedQuery<T>> {
        self.entries.get(key)
    }

    /// Cached entry if it is fresh under `policy`.
    pub fn get_fresh(&self, key: &str, policy: &QueryPolicy) -> Option<CachedQuery<T>> {
        let cached = self.entries.get(key)?;
        if policy.is_fresh(cached.fetched_at, self.clock.now_ms()) {
            tracing::trace!(key, "Query cache hit");
            Some(cached)
        } else {
            tracing::trace!(key, "Query cache stale");
            None
        }
    }

    pub fn insert(&self, key: &str, data: T) -> CachedQuery<T> {
        let cached = CachedQuery {
            data,
            fetched_at: self.clock.now_ms(),
        };
        self.entries.insert(key.to_string(), cached.clone());
        cached
    }

    pub fn invalidate(&self, key: &str) {
        tracing::debug!(key, "Query invalidated");
        self.entries.invalidate(key);
    }

    /// Drop every entry whose key starts with `prefix`. Returns how many.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let keys: Vec<Arc<String>> = self
            .entries
            .iter()
            .map(|(key, _)| key)
            .filter(|key| key.starts_with(prefix))
            .collect();
        for key in &keys {
            self.entries.invalidate(key.as_str());
        }
        tracing::debug!(prefix, removed = keys.len(), "Queries invalidated");
        keys.len()
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
