use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

use super::inflight::InFlight;
use super::store::{CacheStats, CacheStore, StoredEntry};
use crate::config::Config;

/// Process-wide handle on the cache.
///
/// Construct one at start-up and clone it into whatever needs the cache;
/// clones share the same store and in-flight registry.
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<CacheStore>,
    inflight: Arc<InFlight>,
}

impl CacheManager {
    pub fn new(store: CacheStore) -> Self {
        Self {
            store: Arc::new(store),
            inflight: Arc::new(InFlight::new()),
        }
    }

    /// Manager over process-local memory.
    pub fn in_memory() -> Self {
        Self::new(CacheStore::in_memory())
    }

    /// File-backed manager in the configured cache directory.
    pub fn open(config: &Config) -> Result<Self> {
        let dir = config.cache_dir()?;
        let store = CacheStore::open(dir.clone())
            .with_context(|| format!("Failed to open cache directory: {}", dir.display()))?;
        info!(cache_dir = %dir.display(), "Cache opened");
        Ok(Self::new(store))
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub(crate) fn inflight(&self) -> &Arc<InFlight> {
        &self.inflight
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.store.get(key)
    }

    pub fn entry(&self, key: &str) -> Option<StoredEntry> {
        self.store.entry(key)
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        self.store.set(key, value, ttl)
    }

    pub fn remove(&self, key: &str) {
        self.store.remove(key)
    }

    pub fn clear(&self, pattern: Option<&str>) -> usize {
        self.store.clear(pattern)
    }

    pub fn should_refresh(&self, key: &str, interval: Duration) -> bool {
        self.store.should_refresh(key, interval)
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    pub fn prune_expired(&self) -> usize {
        self.store.prune_expired()
    }

    /// Remove every entry. Returns how many were removed.
    pub fn clear_all(&self) -> usize {
        let removed = self.store.clear(None);
        let left = self.store.stats().entry_count;
        if left > 0 {
            warn!(left, "Entries survived clear_all");
        }
        info!(removed, "Cache cleared");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_clones_share_the_store() {
        let manager = CacheManager::in_memory();
        let other = manager.clone();

        manager.set("branches", &vec!["main"], None);

        assert_eq!(other.get::<Vec<String>>("branches"), Some(vec!["main".to_string()]));
    }

    #[test]
    fn test_clear_all_makes_every_get_miss() {
        let manager = CacheManager::in_memory();
        let keys = ["products_b1", "products_b2", "customers", "branches"];
        for (i, key) in keys.iter().enumerate() {
            manager.set(key, &i, Some(Duration::from_secs(3600)));
        }

        assert_eq!(manager.clear_all(), keys.len());

        for key in keys {
            assert_eq!(manager.get::<usize>(key), None);
        }
        assert_eq!(manager.stats().entry_count, 0);
    }

    #[test]
    fn test_open_uses_configured_cache_dir() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = Config {
            cache_dir: Some(temp_dir.path().join("cache")),
            ..Default::default()
        };

        let manager = CacheManager::open(&config).unwrap();
        manager.set("categories", &vec![1, 2], None);

        assert!(temp_dir.path().join("cache").join("k_categories.json").exists());
    }
}
