use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub spotify: SpotifyConfig,
    pub cache: CacheConfig,
    pub refresh: RefreshConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub redirect_port: u16,
    pub api_base: String,
    pub accounts_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    pub active_start_hour: u32,
    pub active_end_hour: u32,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl AppConfig {
    /// Load from `path`; a user file replaces the built-in defaults entirely.
    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        if path.exists() {
            let user_str = std::fs::read_to_string(path)?;
            let user: AppConfig =
                toml::from_str(&user_str).map_err(|e| CoreError::Config(e.to_string()))?;
            user.validate()?;
            Ok(user)
        } else {
            toml::from_str(DEFAULT_CONFIG).map_err(|e| CoreError::Config(e.to_string()))
        }
    }

    /// Save current config to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CoreError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// The Spotify client id, or a config error pointing at the file to edit.
    pub fn client_id(&self) -> Result<&str, CoreError> {
        let id = self.spotify.client_id.trim();
        if id.is_empty() {
            return Err(CoreError::Config(format!(
                "spotify.client_id is not set; add it to {}",
                Self::config_path().display()
            )));
        }
        Ok(id)
    }

    fn validate(&self) -> Result<(), CoreError> {
        let r = &self.refresh;
        if r.active_start_hour > 23 || r.active_end_hour > 24 {
            return Err(CoreError::Config(format!(
                "refresh hours out of range: {}..{}",
                r.active_start_hour, r.active_end_hour
            )));
        }
        if r.active_start_hour >= r.active_end_hour {
            return Err(CoreError::Config(format!(
                "refresh window is empty: active_start_hour ({}) must be before active_end_hour ({})",
                r.active_start_hour, r.active_end_hour
            )));
        }
        Ok(())
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Path to the database file.
    pub fn db_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.data_dir().join("podsync.db"))
            .unwrap_or_else(|| PathBuf::from("podsync.db"))
    }

    /// Ensure the data directory exists and return the DB path.
    pub fn ensure_db_path() -> Result<PathBuf, CoreError> {
        let path = Self::db_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "podsync")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = AppConfig::default();
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert_eq!(config.refresh.active_start_hour, 7);
        assert_eq!(config.refresh.active_end_hour, 19);
        assert_eq!(config.spotify.api_base, "https://api.spotify.com/v1/");
        assert!(config.client_id().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.spotify.client_id = "abc123".into();
        config.cache.ttl_secs = 60;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.client_id().unwrap(), "abc123");
        assert_eq!(loaded.cache.ttl_secs, 60);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded.spotify.redirect_port, 19743);
    }

    #[test]
    fn test_bad_hours_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = AppConfig::default();
        config.refresh.active_start_hour = 30;
        config.save_to(&path).unwrap();

        assert!(matches!(
            AppConfig::load_from(&path),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn test_empty_refresh_window_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        for (start, end) in [(19, 7), (9, 9)] {
            let mut config = AppConfig::default();
            config.refresh.active_start_hour = start;
            config.refresh.active_end_hour = end;
            config.save_to(&path).unwrap();

            match AppConfig::load_from(&path) {
                Err(CoreError::Config(msg)) => assert!(msg.contains("window is empty")),
                other => panic!("expected config error, got {other:?}"),
            }
        }
    }
}
