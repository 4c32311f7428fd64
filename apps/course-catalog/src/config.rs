//! Configuration for course catalog.

use content_tree::Level;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const APP_NAME: &str = "course-catalog";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load() -> Self {
        Self::config_path()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(path) = Self::config_path() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let content = toml::to_string_pretty(self)?;
            std::fs::write(path, content)?;
        }
        Ok(())
    }

    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", APP_NAME)
            .map(|d| d.config_dir().join("config.toml"))
    }

    fn data_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", APP_NAME)
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn db_path(&self) -> PathBuf {
        self.storage
            .db_path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("catalog.db"))
    }

    pub fn blob_root(&self) -> PathBuf {
        self.storage
            .blob_root
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("blobs"))
    }

    pub fn log_path(&self) -> PathBuf {
        self.logging
            .file
            .clone()
            .unwrap_or_else(|| Self::data_dir().join(format!("{APP_NAME}.log")))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub blob_root: Option<PathBuf>,
    /// Prefix for download URLs when blobs are served elsewhere.
    #[serde(default)]
    pub blob_base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Skip the level picker and open this level.
    #[serde(default)]
    pub default_level: Option<Level>,
    #[serde(default = "default_true")]
    pub show_totals: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            default_level: None,
            show_totals: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.display.show_totals);
        assert_eq!(config.logging.level, "info");
        assert!(config.display.default_level.is_none());
        assert!(config.db_path().ends_with("catalog.db"));
        assert!(config.blob_root().ends_with("blobs"));
    }

    #[test]
    fn test_partial_file() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            db_path = "/tmp/c.db"

            [display]
            default_level = "High School"
            show_totals = false
            "#,
        )
        .unwrap();
        assert_eq!(config.db_path(), PathBuf::from("/tmp/c.db"));
        assert_eq!(config.display.default_level, Some(Level::HighSchool));
        assert!(!config.display.show_totals);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_round_trips_through_toml() {
        let mut config = Config::default();
        config.storage.blob_base_url = Some("https://cdn.example".into());
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.storage.blob_base_url.as_deref(), Some("https://cdn.example"));
    }
}
