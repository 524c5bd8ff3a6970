//! Application configuration management.
//!
//! This module handles loading and saving the client configuration,
//! which includes the API base URL and request timeout, and resolves
//! the default on-disk location for the persisted session.
//!
//! Configuration is stored at `~/.config/authcore/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/state directory paths
const APP_NAME: &str = "authcore";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Persisted session file name
const STORE_FILE: &str = "credentials.json";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the authentication API, e.g. `https://api.example.com`.
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

fn default_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Config {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS }
    }

    /// Load the config file if one exists.
    pub fn load() -> Result<Option<Self>> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(Some(serde_json::from_str(&contents)?))
        } else {
            Ok(None)
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Default location for the persisted session store.
    pub fn store_path(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join(STORE_FILE))
    }
}
