//! Configuration file (`civicdb.json`)
//!
//! Only `storage_root` is required; everything else defaults. The
//! `CIVICDB_STORAGE_ROOT` environment variable overrides `storage_root`.
//! Relative roots are resolved against the config file's directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::ErrorKind;
use crate::http_server::HttpServerConfig;
use crate::migration::{TrackerKind, DEFAULT_COMMIT_BATCH_SIZE, DEFAULT_COMMIT_BATCH_THRESHOLD};
use crate::observability::LogFormat;
use crate::search::DEFAULT_MAX_PAGE_SIZE;

pub const STORAGE_ROOT_ENV: &str = "CIVICDB_STORAGE_ROOT";
pub const DEFAULT_CONFIG_FILE: &str = "./civicdb.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::Read { .. } => ErrorKind::Storage,
            ConfigError::Parse(_) | ConfigError::Invalid(_) => ErrorKind::Validation,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Record store root (required)
    pub storage_root: PathBuf,

    #[serde(default = "default_migrations_root")]
    pub migrations_root: PathBuf,

    /// Change tracker backend: "manifest" or "git"
    #[serde(default = "default_tracker")]
    pub tracker: String,

    #[serde(default = "default_commit_batch_size")]
    pub commit_batch_size: usize,

    #[serde(default = "default_commit_batch_threshold")]
    pub commit_batch_threshold: usize,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    #[serde(default)]
    pub http: HttpServerConfig,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_migrations_root() -> PathBuf {
    PathBuf::from("./migrations")
}
fn default_tracker() -> String {
    "manifest".to_string()
}
fn default_commit_batch_size() -> usize {
    DEFAULT_COMMIT_BATCH_SIZE
}
fn default_commit_batch_threshold() -> usize {
    DEFAULT_COMMIT_BATCH_THRESHOLD
}
fn default_max_page_size() -> usize {
    DEFAULT_MAX_PAGE_SIZE
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Config with every optional field defaulted.
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            migrations_root: default_migrations_root(),
            tracker: default_tracker(),
            commit_batch_size: default_commit_batch_size(),
            commit_batch_threshold: default_commit_batch_threshold(),
            max_page_size: default_max_page_size(),
            http: HttpServerConfig::default(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }

    /// Load configuration from file, apply the environment override,
    /// resolve relative roots and validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut config = Self::from_json(&content)?;

        if let Some(dir) = path.parent() {
            config.storage_root = resolve(dir, &config.storage_root);
            config.migrations_root = resolve(dir, &config.migrations_root);
        }
        Ok(config)
    }

    /// Parses and validates JSON text; the environment override applies.
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let mut config: Config = serde_json::from_str(content)?;
        if let Ok(root) = std::env::var(STORAGE_ROOT_ENV) {
            if !root.trim().is_empty() {
                config.storage_root = PathBuf::from(root);
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.storage_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage_root must not be empty".into()));
        }
        if self.commit_batch_size == 0 {
            return Err(ConfigError::Invalid("commit_batch_size must be > 0".into()));
        }
        if self.commit_batch_threshold == 0 {
            return Err(ConfigError::Invalid("commit_batch_threshold must be > 0".into()));
        }
        if self.max_page_size == 0 {
            return Err(ConfigError::Invalid("max_page_size must be > 0".into()));
        }
        self.tracker_kind()?;
        self.log_format()?;
        self.http.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }

    pub fn tracker_kind(&self) -> ConfigResult<TrackerKind> {
        self.tracker.parse().map_err(ConfigError::Invalid)
    }

    pub fn log_format(&self) -> ConfigResult<LogFormat> {
        self.log_format.parse().map_err(ConfigError::Invalid)
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() || base.as_os_str().is_empty() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config: Config = serde_json::from_str(r#"{"storage_root": "./data"}"#).unwrap();
        assert_eq!(config.tracker, "manifest");
        assert_eq!(config.commit_batch_size, 1000);
        assert_eq!(config.max_page_size, 100);
        assert_eq!(config.http.port, 8195);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_storage_root_required() {
        assert!(matches!(
            serde_json::from_str::<Config>("{}").map_err(ConfigError::from),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_invalid_values() {
        let mut config = Config::new("./data");
        config.commit_batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::new("./data");
        config.tracker = "svn".into();
        assert!(config.validate().is_err());

        let mut config = Config::new("./data");
        config.log_format = "xml".into();
        assert!(config.validate().is_err());

        let mut config = Config::new("./data");
        config.http.host = "api.example.org".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_roots_resolved() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("civicdb.json");
        fs::write(&path, r#"{"storage_root": "data", "migrations_root": "/srv/migrations"}"#).unwrap();
        let config = Config::load(&path).unwrap();
        if std::env::var(STORAGE_ROOT_ENV).is_err() {
            assert_eq!(config.storage_root, temp.path().join("data"));
        }
        assert_eq!(config.migrations_root, PathBuf::from("/srv/migrations"));
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = Config::load(&temp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
