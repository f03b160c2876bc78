//! Application configuration for `SlyMapsApp`.
//!
//! `AppConfig` holds the settings the stores and query coordinators need.
//! Provider endpoints and credentials stay in [`ConfigFile`] and are only
//! read when the real adapters are built.

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::config::ConfigFile;
use crate::query::{DEFAULT_QUERY_CACHE_CAPACITY, DEFAULT_SEARCH_DEBOUNCE};
use crate::rate_limit::RateLimitConfig;
use crate::store::PreferencesStore;

/// Settings shared by every part of the application.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// POI cache lifetime and bound.
    pub cache: CacheConfig,

    /// Capacity of each per-feature query cache.
    pub query_cache_capacity: u64,

    /// OneBusAway request window.
    pub rate_limit: RateLimitConfig,

    /// Quiet period before a place search runs.
    pub search_debounce: Duration,

    /// Where the home location is persisted. `None` keeps it in memory only.
    pub preferences_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            query_cache_capacity: DEFAULT_QUERY_CACHE_CAPACITY,
            rate_limit: RateLimitConfig::default(),
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
            preferences_path: None,
        }
    }
}

impl AppConfig {
    /// Derive from the config file, persisting preferences at the default path.
    pub fn from_config_file(config: &ConfigFile) -> Self {
        Self {
            cache: config.cache.to_cache_config(),
            query_cache_capacity: config.cache.query_capacity,
            rate_limit: config.rate_limit.to_rate_limit_config(),
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
            preferences_path: PreferencesStore::default_path(),
        }
    }

    pub fn with_preferences_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.preferences_path = Some(path.into());
        self
    }

    pub fn with_search_debounce(mut self, delay: Duration) -> Self {
        self.search_debounce = delay;
        self
    }
}
