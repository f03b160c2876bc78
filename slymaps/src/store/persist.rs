//! Persisted user preferences.
//!
//! Only the home location survives a restart. Transient UI flags live on the
//! same struct for convenience but are never written to disk.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::LatLng;

/// Errors reading or writing the preferences file.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to access preferences at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("preferences at {path} are malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The user's saved home location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeLocation {
    pub name: String,
    pub position: LatLng,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl HomeLocation {
    pub fn new(name: impl Into<String>, position: LatLng) -> Self {
        Self {
            name: name.into(),
            position,
            address: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

/// Preferences record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub home: Option<HomeLocation>,

    /// The "set home" picker is open.
    #[serde(skip)]
    pub is_setting_home: bool,

    /// The home marker popup is open.
    #[serde(skip)]
    pub show_home_popup: bool,
}

/// JSON file holding [`Preferences`].
#[derive(Debug, Clone)]
pub struct PreferencesStore {
    path: PathBuf,
}

impl PreferencesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/slymaps/preferences.json`, if the platform has a data dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("slymaps").join("preferences.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load preferences. A missing file yields defaults.
    pub fn load(&self) -> Result<Preferences, PersistError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No saved preferences");
                return Ok(Preferences::default());
            }
            Err(source) => {
                return Err(PersistError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_reader(BufReader::new(file)).map_err(|source| PersistError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    /// Write preferences, replacing the file in one step.
    pub fn save(&self, preferences: &Preferences) -> Result<(), PersistError> {
        let io_err = |source| PersistError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let file = File::create(&temp_path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, preferences).map_err(|source| {
            PersistError::Malformed {
                path: self.path.clone(),
                source,
            }
        })?;
        writer.flush().map_err(io_err)?;
        drop(writer);

        std::fs::rename(&temp_path, &self.path).map_err(io_err)?;
        tracing::debug!(path = %self.path.display(), "Preferences saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let store = PreferencesStore::new(dir.path().join("prefs.json"));
        assert_eq!(store.load().unwrap(), Preferences::default());
    }

    #[test]
    fn test_home_survives_and_transient_flags_do_not() {
        let dir = TempDir::new().unwrap();
        let store = PreferencesStore::new(dir.path().join("nested").join("prefs.json"));

        let prefs = Preferences {
            home: Some(
                HomeLocation::new("Home", LatLng::new(47.61, -122.33)).with_address("1st Ave"),
            ),
            is_setting_home: true,
            show_home_popup: true,
        };
        store.save(&prefs).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("is_setting_home"));
        assert!(!raw.contains("show_home_popup"));

        let loaded = store.load().unwrap();
        assert_eq!(loaded.home, prefs.home);
        assert!(!loaded.is_setting_home);
        assert!(!loaded.show_home_popup);
    }

    #[test]
    fn test_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = PreferencesStore::new(&path).load().unwrap_err();
        assert!(matches!(err, PersistError::Malformed { .. }));
    }
}
