//! Registry configuration
//!
//! Loaded from TOML; every field has a default. Without a `data_dir` the
//! registry runs fully in memory.
//!
//! ```toml
//! data_dir = "/var/lib/clinic"
//! pool_size = 4
//! filter_delay_ms = 0
//! log_level = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Overrides `data_dir` in `from_env_or_default`
pub const DATA_DIR_ENV: &str = "CLIENTELE_DATA_DIR";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Directory holding all three stores; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
    pub clients_file: String,
    pub audit_file: String,
    pub preferences_file: String,
    /// Max pooled SQLite connections per database
    pub pool_size: u32,
    /// Pause before each non-blank search computation
    pub filter_delay_ms: u64,
    /// Buffered events per `subscribe_events` receiver
    pub event_capacity: usize,
    pub log_level: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            clients_file: "clients.sqlite3".to_string(),
            audit_file: "audit.sqlite3".to_string(),
            preferences_file: "preferences.json".to_string(),
            pool_size: 4,
            filter_delay_ms: 0,
            event_capacity: 64,
            log_level: "info".to_string(),
        }
    }
}

impl RegistryConfig {
    /// File-less configuration: in-memory SQLite and preferences
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Default configuration rooted at `dir`
    pub fn with_data_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Defaults, with `CLIENTELE_DATA_DIR` applied when set and non-empty
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply environment overrides on top of this configuration
    pub fn apply_env(&mut self) {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|dir| !dir.is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.data_dir.is_none()
    }

    pub fn clients_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(&self.clients_file))
    }

    pub fn audit_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(&self.audit_file))
    }

    pub fn preferences_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(&self.preferences_file))
    }

    pub fn filter_delay(&self) -> Duration {
        Duration::from_millis(self.filter_delay_ms)
    }
}
