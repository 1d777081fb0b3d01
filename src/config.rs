//! Store configuration
//!
//! All knobs have defaults; a deployment can override them from a TOML file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for the record store and its locking protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Age in milliseconds after which a lock file is considered stale and
    /// may be removed by a contending process.
    #[serde(default = "default_stale_lock_ms")]
    pub stale_lock_ms: u64,

    /// Fixed back-off between lock acquisition attempts.
    #[serde(default = "default_lock_retry_ms")]
    pub lock_retry_ms: u64,

    /// Total acquisition attempts before failing with a lock timeout.
    #[serde(default = "default_lock_attempts")]
    pub lock_attempts: u32,

    /// File name (sibling of the canonical file) adopted on first touch when
    /// the canonical file does not exist yet.
    #[serde(default = "default_legacy_file")]
    pub legacy_file: String,

    /// Whether the legacy file is deleted after its bytes are copied to the
    /// canonical path. Off by default: adoption is non-destructive.
    #[serde(default)]
    pub remove_legacy: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            stale_lock_ms: default_stale_lock_ms(),
            lock_retry_ms: default_lock_retry_ms(),
            lock_attempts: default_lock_attempts(),
            legacy_file: default_legacy_file(),
            remove_legacy: false,
        }
    }
}

fn default_stale_lock_ms() -> u64 {
    30_000
}

fn default_lock_retry_ms() -> u64 {
    50
}

fn default_lock_attempts() -> u32 {
    100
}

fn default_legacy_file() -> String {
    "tasks.json".to_string()
}

impl StoreConfig {
    /// Load configuration from a TOML file. Missing fields take defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StoreConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = StoreConfig::default();
        assert_eq!(config.stale_lock_ms, 30_000);
        assert_eq!(config.lock_retry_ms, 50);
        assert_eq!(config.lock_attempts, 100);
        assert_eq!(config.legacy_file, "tasks.json");
        assert!(!config.remove_legacy);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: StoreConfig = toml::from_str("stale_lock_ms = 5000").expect("parse");
        assert_eq!(config.stale_lock_ms, 5000);
        assert_eq!(config.lock_retry_ms, 50);
    }
}
