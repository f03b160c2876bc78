//! INI configuration file.
//!
//! Settings live in `<config dir>/slymaps/config.ini`:
//!
//! ```ini
//! [onebusaway]
//! api_key = your-oba-key
//! base_url = https://api.pugetsound.onebusaway.org/api/where
//!
//! [mapbox]
//! access_token = pk.xxx
//!
//! [otp]
//! url = http://localhost:8080
//!
//! [overpass]
//! max_in_flight = 2
//!
//! [cache]
//! environment = production
//! max_entries = 2000
//!
//! [rate_limit]
//! max_requests = 10
//! window_ms = 1000
//!
//! [logging]
//! level = info
//! ```
//!
//! A missing file means defaults. Environment variables override the file:
//! `SLYMAPS_OBA_API_KEY`, `SLYMAPS_MAPBOX_TOKEN`, `SLYMAPS_OTP_URL` and
//! `SLYMAPS_ENV`.

mod keys;

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::cache::{CacheConfig, CacheEnvironment, DEFAULT_MAX_ENTRIES};
use crate::provider::{
    MAPBOX_BASE_URL, NOMINATIM_BASE_URL, OBA_BASE_URL, OVERPASS_BASE_URL, OVERPASS_MAX_IN_FLIGHT,
};
use crate::query::DEFAULT_QUERY_CACHE_CAPACITY;
use crate::rate_limit::{RateLimitConfig, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};

pub use keys::ConfigKey;

/// Environment variable overriding `onebusaway.api_key`.
pub const ENV_OBA_API_KEY: &str = "SLYMAPS_OBA_API_KEY";
/// Environment variable overriding `mapbox.access_token`.
pub const ENV_MAPBOX_TOKEN: &str = "SLYMAPS_MAPBOX_TOKEN";
/// Environment variable overriding `otp.url`.
pub const ENV_OTP_URL: &str = "SLYMAPS_OTP_URL";
/// Environment variable overriding `cache.environment`.
pub const ENV_ENVIRONMENT: &str = "SLYMAPS_ENV";

/// Errors loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid value '{value}' for {section}.{key}: {reason}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// Path of the configuration file.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("slymaps")
        .join("config.ini")
}

#[derive(Debug, Clone, PartialEq)]
pub struct OneBusAwaySettings {
    pub api_key: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapboxSettings {
    pub access_token: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OtpSettings {
    /// Server root, e.g. `http://localhost:8080`. Unset disables planning.
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverpassSettings {
    pub url: String,
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NominatimSettings {
    pub url: String,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub environment: CacheEnvironment,
    pub max_entries: u64,
    pub query_capacity: u64,
}

impl CacheSettings {
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig::for_environment(self.environment).with_max_entries(self.max_entries)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitSettings {
    pub max_requests: usize,
    pub window_ms: u64,
}

impl RateLimitSettings {
    pub fn to_rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.max_requests,
            window: Duration::from_millis(self.window_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
    /// Log to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Parsed `config.ini`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub onebusaway: OneBusAwaySettings,
    pub mapbox: MapboxSettings,
    pub otp: OtpSettings,
    pub overpass: OverpassSettings,
    pub nominatim: NominatimSettings,
    pub cache: CacheSettings,
    pub rate_limit: RateLimitSettings,
    pub logging: LoggingSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            onebusaway: OneBusAwaySettings {
                api_key: None,
                base_url: OBA_BASE_URL.to_string(),
            },
            mapbox: MapboxSettings {
                access_token: None,
                base_url: MAPBOX_BASE_URL.to_string(),
            },
            otp: OtpSettings::default(),
            overpass: OverpassSettings {
                url: OVERPASS_BASE_URL.to_string(),
                max_in_flight: OVERPASS_MAX_IN_FLIGHT,
            },
            nominatim: NominatimSettings {
                url: NOMINATIM_BASE_URL.to_string(),
                user_agent: None,
            },
            cache: CacheSettings {
                environment: CacheEnvironment::default(),
                max_entries: DEFAULT_MAX_ENTRIES,
                query_capacity: DEFAULT_QUERY_CACHE_CAPACITY,
            },
            rate_limit: RateLimitSettings {
                max_requests: DEFAULT_MAX_REQUESTS,
                window_ms: DEFAULT_WINDOW.as_millis() as u64,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                file: None,
            },
        }
    }
}

impl ConfigFile {
    /// Load from the default path, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&config_file_path())?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| match e {
            ini::Error::Io(source) => ConfigError::Io {
                path: path.to_path_buf(),
                source,
            },
            ini::Error::Parse(e) => ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        })?;
        Self::from_ini(&ini)
    }

    /// Parse INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<string>"),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|section| section.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (usually `std::env::var`).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides = [
            (ENV_OBA_API_KEY, ConfigKey::ObaApiKey),
            (ENV_MAPBOX_TOKEN, ConfigKey::MapboxAccessToken),
            (ENV_OTP_URL, ConfigKey::OtpUrl),
            (ENV_ENVIRONMENT, ConfigKey::CacheEnvironment),
        ];
        for (variable, key) in overrides {
            if let Some(value) = lookup(variable).filter(|v| !v.trim().is_empty()) {
                tracing::debug!(variable, key = %key.name(), "Config overridden from environment");
                key.set(self, &value)?;
            }
        }
        Ok(())
    }

    /// Save to the default path.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories. Unset keys are omitted.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        ini.write_to_file(path).map_err(io_err)?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// `(section.key, value)` pairs for display, secrets masked.
    pub fn entries(&self) -> Vec<(String, String)> {
        ConfigKey::all()
            .iter()
            .map(|key| (key.name(), key.display_value(self)))
            .collect()
    }
}
