//! Store configuration.
//!
//! Persisted as pretty JSON next to the data (like a database config
//! file) and read once when a `StoreManager` is opened.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OlapError, Result};
use crate::resource::ResourceManager;

/// Searcher cache population when `searcher_cache_size` is unset.
pub const DEFAULT_SEARCHER_CACHE_SIZE: usize = 8192;

/// Upper clamp applied to any configured searcher cache size.
pub const DEFAULT_SEARCHER_CACHE_MAX: usize = 65_536;

/// Total attempts for a shard query that hits a deleted segment.
pub const DEFAULT_SEARCH_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory; shards live under `applications/<app>/<shard>`.
    pub data_dir: PathBuf,
    /// Searcher LRU capacity. None = `DEFAULT_SEARCHER_CACHE_SIZE`.
    pub searcher_cache_size: Option<usize>,
    /// Hard ceiling for the searcher LRU capacity.
    pub searcher_cache_max: usize,
    /// Byte budget for decoded field payloads. None = auto-tuned.
    pub field_cache_bytes: Option<usize>,
    /// Per-shard fan-out pool size. 0 = run shard queries on the caller's thread.
    pub search_threads: usize,
    /// Total attempts when a resolved cube disappears mid-query.
    pub search_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            searcher_cache_size: None,
            searcher_cache_max: DEFAULT_SEARCHER_CACHE_MAX,
            field_cache_bytes: None,
            search_threads: 0,
            search_attempts: DEFAULT_SEARCH_ATTEMPTS,
        }
    }
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Read config from a JSON file.
    pub fn read_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write config as pretty JSON.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.search_attempts == 0 {
            return Err(OlapError::InvalidConfig(
                "search_attempts must be at least 1".to_string(),
            ));
        }
        if self.searcher_cache_max == 0 {
            return Err(OlapError::InvalidConfig(
                "searcher_cache_max must be positive".to_string(),
            ));
        }
        if self.field_cache_bytes == Some(0) {
            return Err(OlapError::InvalidConfig(
                "field_cache_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective searcher cache capacity: default when unset, clamped to
    /// `[1, searcher_cache_max]`.
    pub fn searcher_capacity(&self) -> usize {
        self.searcher_cache_size
            .unwrap_or(DEFAULT_SEARCHER_CACHE_SIZE)
            .clamp(1, self.searcher_cache_max.max(1))
    }

    /// Effective field cache budget in bytes.
    pub fn field_cache_budget(&self) -> usize {
        self.field_cache_bytes
            .unwrap_or_else(|| ResourceManager::auto_tune().field_cache_bytes)
    }

    // Builder helpers

    pub fn with_searcher_cache_size(mut self, size: usize) -> Self {
        self.searcher_cache_size = Some(size);
        self
    }

    pub fn with_field_cache_bytes(mut self, bytes: usize) -> Self {
        self.field_cache_bytes = Some(bytes);
        self
    }

    pub fn with_search_threads(mut self, threads: usize) -> Self {
        self.search_threads = threads;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let config = StoreConfig::new(dir.path()).with_searcher_cache_size(16);
        config.write_to(&path).unwrap();
        assert_eq!(StoreConfig::read_from(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: StoreConfig = serde_json::from_str(r#"{"data_dir":"/tmp/x"}"#).unwrap();
        assert_eq!(config.search_attempts, DEFAULT_SEARCH_ATTEMPTS);
        assert_eq!(config.searcher_capacity(), DEFAULT_SEARCHER_CACHE_SIZE);
    }

    #[test]
    fn test_searcher_capacity_clamped() {
        let mut config = StoreConfig::default().with_searcher_cache_size(1_000_000);
        config.searcher_cache_max = 100;
        assert_eq!(config.searcher_capacity(), 100);

        let config = StoreConfig::default().with_searcher_cache_size(0);
        assert_eq!(config.searcher_capacity(), 1);
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = StoreConfig::default();
        config.search_attempts = 0;
        assert!(matches!(config.validate(), Err(OlapError::InvalidConfig(_))));
    }

    #[test]
    fn test_explicit_field_budget_wins() {
        let config = StoreConfig::default().with_field_cache_bytes(4096);
        assert_eq!(config.field_cache_budget(), 4096);
    }
}
