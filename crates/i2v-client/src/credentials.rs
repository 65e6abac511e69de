//! Cached API key.
//!
//! The key lives in a small JSON object on disk under a fixed entry name, the
//! same shape a browser's local storage would hold.

use crate::api::{ApiKeyCheck, TaskApi};
use crate::error::{ClientError, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Storage entry holding the API key
pub const API_KEY_STORAGE_KEY: &str = "siliconflow_api_key";

/// What `CredentialStore::set` did with the value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUpdate {
    Saved,
    Cleared,
}

#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let buf = fs::read(&self.path)?;
        if buf.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Map::new());
        }
        Ok(serde_json::from_slice(&buf)?)
    }

    fn write_entries(&self, entries: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;

        // Owner read/write only (600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// Stored key, if any.
    pub fn load(&self) -> Result<Option<String>> {
        let entries = self.read_entries()?;
        Ok(entries
            .get(API_KEY_STORAGE_KEY)
            .and_then(Value::as_str)
            .filter(|key| !key.is_empty())
            .map(str::to_string))
    }

    /// Store a trimmed non-empty value, or delete the entry for an empty one.
    pub fn set(&self, value: &str) -> Result<KeyUpdate> {
        let value = value.trim();
        let mut entries = self.read_entries()?;
        let update = if value.is_empty() {
            entries.remove(API_KEY_STORAGE_KEY);
            KeyUpdate::Cleared
        } else {
            entries.insert(
                API_KEY_STORAGE_KEY.to_string(),
                Value::String(value.to_string()),
            );
            KeyUpdate::Saved
        };
        self.write_entries(&entries)?;
        debug!(path = %self.path.display(), ?update, "credential store updated");
        Ok(update)
    }

    pub fn clear(&self) -> Result<()> {
        self.set("").map(|_| ())
    }

    /// Key to send with requests: `override_key` when non-empty, else the
    /// stored key, else the empty string.
    pub fn resolve(&self, override_key: Option<&str>) -> String {
        if let Some(key) = override_key.map(str::trim).filter(|k| !k.is_empty()) {
            return key.to_string();
        }
        self.load().ok().flatten().unwrap_or_default()
    }

    /// Validate `value` against the backend and persist it only on success.
    pub async fn test(&self, api: &dyn TaskApi, value: &str) -> Result<ApiKeyCheck> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ClientError::validation("enter an API key first"));
        }

        let check = api.test_api_key(value).await?;
        if check.success {
            self.set(value)?;
            info!("API key validated and saved");
        } else {
            info!(message = %check.message, "API key rejected");
        }
        Ok(check)
    }
}
