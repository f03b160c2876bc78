//! Addressable configuration keys (`section.key`).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::{ConfigError, ConfigFile};
use crate::cache::CacheEnvironment;

/// Every key that can be read, written or listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    ObaApiKey,
    ObaBaseUrl,
    MapboxAccessToken,
    MapboxBaseUrl,
    OtpUrl,
    OverpassUrl,
    OverpassMaxInFlight,
    NominatimUrl,
    NominatimUserAgent,
    CacheEnvironment,
    CacheMaxEntries,
    CacheQueryCapacity,
    RateLimitMaxRequests,
    RateLimitWindowMs,
    LoggingLevel,
    LoggingFile,
}

const ALL_KEYS: [ConfigKey; 16] = [
    ConfigKey::ObaApiKey,
    ConfigKey::ObaBaseUrl,
    ConfigKey::MapboxAccessToken,
    ConfigKey::MapboxBaseUrl,
    ConfigKey::OtpUrl,
    ConfigKey::OverpassUrl,
    ConfigKey::OverpassMaxInFlight,
    ConfigKey::NominatimUrl,
    ConfigKey::NominatimUserAgent,
    ConfigKey::CacheEnvironment,
    ConfigKey::CacheMaxEntries,
    ConfigKey::CacheQueryCapacity,
    ConfigKey::RateLimitMaxRequests,
    ConfigKey::RateLimitWindowMs,
    ConfigKey::LoggingLevel,
    ConfigKey::LoggingFile,
];

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl ConfigKey {
    /// All keys, grouped by section in file order.
    pub fn all() -> &'static [ConfigKey] {
        &ALL_KEYS
    }

    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::ObaApiKey | ConfigKey::ObaBaseUrl => "onebusaway",
            ConfigKey::MapboxAccessToken | ConfigKey::MapboxBaseUrl => "mapbox",
            ConfigKey::OtpUrl => "otp",
            ConfigKey::OverpassUrl | ConfigKey::OverpassMaxInFlight => "overpass",
            ConfigKey::NominatimUrl | ConfigKey::NominatimUserAgent => "nominatim",
            ConfigKey::CacheEnvironment
            | ConfigKey::CacheMaxEntries
            | ConfigKey::CacheQueryCapacity => "cache",
            ConfigKey::RateLimitMaxRequests | ConfigKey::RateLimitWindowMs => "rate_limit",
            ConfigKey::LoggingLevel | ConfigKey::LoggingFile => "logging",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::ObaApiKey => "api_key",
            ConfigKey::MapboxAccessToken => "access_token",
            ConfigKey::ObaBaseUrl | ConfigKey::MapboxBaseUrl => "base_url",
            ConfigKey::OtpUrl | ConfigKey::OverpassUrl | ConfigKey::NominatimUrl => "url",
            ConfigKey::OverpassMaxInFlight => "max_in_flight",
            ConfigKey::NominatimUserAgent => "user_agent",
            ConfigKey::CacheEnvironment => "environment",
            ConfigKey::CacheMaxEntries => "max_entries",
            ConfigKey::CacheQueryCapacity => "query_capacity",
            ConfigKey::RateLimitMaxRequests => "max_requests",
            ConfigKey::RateLimitWindowMs => "window_ms",
            ConfigKey::LoggingLevel => "level",
            ConfigKey::LoggingFile => "file",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Credentials are masked when listed.
    pub fn is_secret(&self) -> bool {
        matches!(self, ConfigKey::ObaApiKey | ConfigKey::MapboxAccessToken)
    }

    /// Current value as text. Unset optional values are empty.
    pub fn get(&self, config: &ConfigFile) -> String {
        fn opt(value: &Option<String>) -> String {
            value.clone().unwrap_or_default()
        }

        match self {
            ConfigKey::ObaApiKey => opt(&config.onebusaway.api_key),
            ConfigKey::ObaBaseUrl => config.onebusaway.base_url.clone(),
            ConfigKey::MapboxAccessToken => opt(&config.mapbox.access_token),
            ConfigKey::MapboxBaseUrl => config.mapbox.base_url.clone(),
            ConfigKey::OtpUrl => opt(&config.otp.url),
            ConfigKey::OverpassUrl => config.overpass.url.clone(),
            ConfigKey::OverpassMaxInFlight => config.overpass.max_in_flight.to_string(),
            ConfigKey::NominatimUrl => config.nominatim.url.clone(),
            ConfigKey::NominatimUserAgent => opt(&config.nominatim.user_agent),
            ConfigKey::CacheEnvironment => config.cache.environment.as_str().to_string(),
            ConfigKey::CacheMaxEntries => config.cache.max_entries.to_string(),
            ConfigKey::CacheQueryCapacity => config.cache.query_capacity.to_string(),
            ConfigKey::RateLimitMaxRequests => config.rate_limit.max_requests.to_string(),
            ConfigKey::RateLimitWindowMs => config.rate_limit.window_ms.to_string(),
            ConfigKey::LoggingLevel => config.logging.level.clone(),
            ConfigKey::LoggingFile => config
                .logging
                .file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Value for display. Secrets keep their first four characters, short
    /// ones are masked entirely.
    pub fn display_value(&self, config: &ConfigFile) -> String {
        let value = self.get(config);
        if !self.is_secret() || value.is_empty() {
            return value;
        }
        let len = value.chars().count();
        if len <= 8 {
            return "*".repeat(len);
        }
        let visible: String = value.chars().take(4).collect();
        format!("{}{}", visible, "*".repeat(len - 4))
    }

    /// Validate and store `value`. An empty value clears optional keys.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        let optional = || (!value.is_empty()).then(|| value.to_string());

        match self {
            ConfigKey::ObaApiKey => config.onebusaway.api_key = optional(),
            ConfigKey::ObaBaseUrl => config.onebusaway.base_url = self.url(value)?,
            ConfigKey::MapboxAccessToken => config.mapbox.access_token = optional(),
            ConfigKey::MapboxBaseUrl => config.mapbox.base_url = self.url(value)?,
            ConfigKey::OtpUrl => {
                config.otp.url = match optional() {
                    Some(url) => Some(self.url(&url)?),
                    None => None,
                }
            }
            ConfigKey::OverpassUrl => config.overpass.url = self.url(value)?,
            ConfigKey::OverpassMaxInFlight => {
                config.overpass.max_in_flight = self.positive(value)?
            }
            ConfigKey::NominatimUrl => config.nominatim.url = self.url(value)?,
            ConfigKey::NominatimUserAgent => config.nominatim.user_agent = optional(),
            ConfigKey::CacheEnvironment => {
                config.cache.environment = value
                    .parse::<CacheEnvironment>()
                    .map_err(|reason| self.invalid(value, reason))?
            }
            ConfigKey::CacheMaxEntries => config.cache.max_entries = self.positive(value)?,
            ConfigKey::CacheQueryCapacity => config.cache.query_capacity = self.positive(value)?,
            ConfigKey::RateLimitMaxRequests => {
                config.rate_limit.max_requests = self.positive(value)?
            }
            ConfigKey::RateLimitWindowMs => config.rate_limit.window_ms = self.positive(value)?,
            ConfigKey::LoggingLevel => {
                let level = value.to_lowercase();
                if !LOG_LEVELS.contains(&level.as_str()) {
                    return Err(self.invalid(
                        value,
                        format!("expected one of {}", LOG_LEVELS.join(", ")),
                    ));
                }
                config.logging.level = level;
            }
            ConfigKey::LoggingFile => config.logging.file = optional().map(PathBuf::from),
        }
        Ok(())
    }

    fn invalid(&self, value: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidValue {
            section: self.section(),
            key: self.key_name(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    fn url(&self, value: &str) -> Result<String, ConfigError> {
        if value.starts_with("http://") || value.starts_with("https://") {
            Ok(value.trim_end_matches('/').to_string())
        } else {
            Err(self.invalid(value, "expected an http(s) URL"))
        }
    }

    fn positive<N>(&self, value: &str) -> Result<N, ConfigError>
    where
        N: FromStr + PartialOrd + Default,
        N::Err: fmt::Display,
    {
        let n: N = value
            .parse()
            .map_err(|e: N::Err| self.invalid(value, e.to_string()))?;
        if n <= N::default() {
            return Err(self.invalid(value, "must be greater than zero"));
        }
        Ok(n)
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
