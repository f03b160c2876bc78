//! In-memory caching for provider lookups.
//!
//! [`TtlCache`] is the shared cache service used for POI lookups. One
//! instance is created by the application and handed to every consumer, so
//! callers must choose cache keys that are unique per feature (for example
//! `pois:<lat>:<lng>:<radius>:<category>:<page>`).
//!
//! # Default lifetimes
//!
//! Development runs keep entries longer to reduce load on the external APIs
//! while iterating:
//!
//! | Environment | Default TTL |
//! |-------------|-------------|
//! | development | 24 h        |
//! | production  | 12 h        |

mod ttl;

use std::fmt;
use std::time::Duration;

pub use ttl::{CacheEntry, TtlCache};

/// Default TTL in development.
pub const DEVELOPMENT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default TTL in production.
pub const PRODUCTION_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Default entry bound.
pub const DEFAULT_MAX_ENTRIES: u64 = 2_000;

/// Deployment flavour, used to pick default cache lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheEnvironment {
    #[default]
    Development,
    Production,
}

impl CacheEnvironment {
    pub fn default_ttl(&self) -> Duration {
        match self {
            CacheEnvironment::Development => DEVELOPMENT_TTL,
            CacheEnvironment::Production => PRODUCTION_TTL,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheEnvironment::Development => "development",
            CacheEnvironment::Production => "production",
        }
    }
}

impl std::str::FromStr for CacheEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(CacheEnvironment::Development),
            "production" | "prod" => Ok(CacheEnvironment::Production),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

/// Sizing and lifetime for a [`TtlCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub default_ttl: Duration,
    pub max_entries: u64,
}

impl CacheConfig {
    pub fn for_environment(environment: CacheEnvironment) -> Self {
        Self {
            default_ttl: environment.default_ttl(),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    pub fn with_max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = max_entries;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::for_environment(CacheEnvironment::default())
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub entries: u64,
    pub max_entries: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} entries, {} hits, {} misses ({:.0}% hit rate), {} expired",
            self.entries,
            self.max_entries,
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.expirations
        )
    }
}
