//! Datasource instance file.
//!
//! ```json
//! {
//!   "uid": "ws-feed",
//!   "jsonData": {"url": "wss://feed.example.com/api", "headerName1": "Authorization"},
//!   "decryptedSecureJsonData": {"headerValue1": "Bearer ..."}
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::Value;

/// Resolve the default instance file path (`~/.wsbridge/instance.json`).
pub fn default_instance_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".wsbridge").join("instance.json")
}

/// One datasource instance as stored on disk.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceFile {
    /// Datasource UID; the middle segment of every channel name.
    pub uid: String,
    /// Plain configuration object, validated when the instance is built.
    #[serde(default)]
    pub json_data: Value,
    /// Secret values keyed by the names `jsonData` refers to.
    #[serde(default)]
    pub decrypted_secure_json_data: HashMap<String, String>,
}

impl InstanceFile {
    /// Read and parse an instance file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read instance file: {}", path.display()))?;
        let instance: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse instance file: {}", path.display()))?;
        if instance.uid.trim().is_empty() {
            bail!("instance file {} has an empty uid", path.display());
        }
        Ok(instance)
    }

    /// `jsonData` as the raw text the settings resolver expects.
    pub fn raw_json(&self) -> String {
        if self.json_data.is_null() {
            String::new()
        } else {
            self.json_data.to_string()
        }
    }
}
