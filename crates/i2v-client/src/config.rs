//! Client configuration.
//!
//! Values come from a JSON file with serde defaults for every field, then
//! `I2V_BASE_URL` overrides the backend address.

use crate::error::Result;
use crate::poller::PollerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5001";
pub const BASE_URL_ENV: &str = "I2V_BASE_URL";
pub const API_KEY_ENV: &str = "I2V_API_KEY";

/// Local data directory for persisted client state.
pub fn app_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
    base.join("i2v_client")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend root, e.g. `http://127.0.0.1:5001`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Seconds between poll cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Extra attempts after a failed task list fetch
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,

    /// Fixed delay between task list fetch attempts
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Abort the bulk task list fetch after this many seconds
    #[serde(default)]
    pub list_timeout_secs: Option<u64>,

    /// Credential store location, defaults to the app data dir
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_poll_interval() -> u64 {
    3
}

fn default_fetch_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            poll_interval_secs: default_poll_interval(),
            fetch_retries: default_fetch_retries(),
            retry_delay_ms: default_retry_delay(),
            list_timeout_secs: None,
            credentials_path: None,
        }
    }
}

impl ClientConfig {
    /// Default config file location.
    pub fn default_path() -> PathBuf {
        app_data_dir().join("config.json")
    }

    /// Load configuration from JSON
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Load from `path` if given, else from the default location. A missing
    /// default file yields the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save configuration to JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn with_env(self) -> Self {
        self.with_env_from(|name| std::env::var(name).ok())
    }

    pub fn with_env_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    pub fn with_list_timeout(mut self, secs: u64) -> Self {
        self.list_timeout_secs = Some(secs);
        self
    }

    pub fn list_timeout(&self) -> Option<Duration> {
        self.list_timeout_secs.map(Duration::from_secs)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.credentials_path
            .clone()
            .unwrap_or_else(|| app_data_dir().join("credentials.json"))
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            fetch_retries: self.fetch_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"base_url": "http://backend:8000"}"#).unwrap();
        assert_eq!(config.base_url, "http://backend:8000");
        assert_eq!(config.poll_interval_secs, 3);
        assert_eq!(config.fetch_retries, 3);
        assert_eq!(config.retry_delay_ms, 1000);
        assert!(config.list_timeout().is_none());
    }

    #[test]
    fn test_env_overrides_base_url() {
        let env: HashMap<&str, &str> = [(BASE_URL_ENV, " http://remote:5001 ")].into();
        let config = ClientConfig::default().with_env_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.base_url, "http://remote:5001");

        let blank = ClientConfig::default().with_env_from(|_| Some("  ".to_string()));
        assert_eq!(blank.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = ClientConfig::default()
            .with_poll_interval(10)
            .with_list_timeout(15);
        config.save(&path).unwrap();

        let loaded = ClientConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.poller_config().interval, Duration::from_secs(10));
        assert_eq!(loaded.list_timeout(), Some(Duration::from_secs(15)));
    }
}
