// User settings
// Loaded from <config dir>/floorbook/settings.toml

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const APP_DIR: &str = "floorbook";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot access {path}: {message}")]
    Io { path: PathBuf, message: String },
    #[error("invalid settings in {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("cannot encode settings: {0}")]
    Encode(String),
}

/// Where the attendance database lives
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// None = platform data dir
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// HTTP order feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    /// Base URL of the shop's admin API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    pub page_size: u32,

    pub timeout_secs: u64,

    pub max_retries: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            page_size: 250,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Sync config used when `--config` is not given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub feed: FeedSettings,
    pub sync: SyncSettings,
}

impl Settings {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("settings.toml")
    }

    /// Load from the default location. A missing or broken file falls back
    /// to defaults.
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            debug!(path = %path.display(), "no settings file; using defaults");
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("{e}; using default settings");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        toml::from_str(&contents).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |e: std::io::Error| SettingsError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| SettingsError::Encode(e.to_string()))?;
        fs::write(path, text).map_err(io_err)
    }

    /// Configured database path, else `<data dir>/floorbook/floorbook.db`.
    pub fn database_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("floorbook.db")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "[feed]\nbase_url = \"https://shop.example.com\"\n").unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.feed.base_url.as_deref(), Some("https://shop.example.com"));
        assert_eq!(settings.feed.page_size, 250);
        assert_eq!(settings.feed.timeout_secs, 30);
        assert!(settings.database.path.is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/settings.toml");
        let mut settings = Settings::default();
        settings.database.path = Some(PathBuf::from("/var/lib/floorbook/school.db"));
        settings.sync.config_path = Some(PathBuf::from("term2.sync.toml"));
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.database_path(), PathBuf::from("/var/lib/floorbook/school.db"));
    }

    #[test]
    fn broken_file_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "[feed\npage_size = ").unwrap();
        assert!(matches!(Settings::load_from(&path), Err(SettingsError::Parse { .. })));
    }

    #[test]
    fn default_database_path_is_under_app_dir() {
        let path = Settings::default().database_path();
        assert!(path.ends_with("floorbook/floorbook.db"));
    }
}
