use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub base_url: String,
    pub request_timeout_seconds: u64,
    pub max_redirects: usize,
    pub user_agent: String,
}

/// Limits applied to the in-memory object cache.
///
/// A `count_limit` of zero disables the entry-count bound; a missing
/// `total_cost_limit` disables the byte budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub count_limit: usize,
    pub total_cost_limit: Option<usize>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_url: "https://jsonplaceholder.typicode.com".to_string(),
            request_timeout_seconds: 10,
            max_redirects: 5,
            user_agent: concat!("listfeed/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            count_limit: 500,
            total_cost_limit: None,
        }
    }
}

impl CacheConfig {
    pub fn with_cost_limit(mut self, bytes: usize) -> Self {
        self.total_cost_limit = Some(bytes);
        self
    }

    pub fn with_count_limit(mut self, entries: usize) -> Self {
        self.count_limit = entries;
        self
    }
}

impl AppConfig {
    /// Path of the configuration file inside the platform config directory.
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("listfeed").join("config.json"))
    }

    /// Loads the configuration from its default location, falling back to
    /// defaults when the file is missing or unreadable.
    pub fn load() -> Self {
        match Self::config_file_path() {
            Ok(path) => Self::load_from(path),
            Err(e) => {
                warn!(error = %e, "using default configuration");
                Self::default()
            }
        }
    }

    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to load configuration, using defaults");
                Self::default()
            }
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        // atomic write
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::config_file_path()?)
    }
}
