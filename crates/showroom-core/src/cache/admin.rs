//! Administrative view over the whole cache: statistics and bulk
//! invalidation. Every mutation re-reads the statistics.

use std::sync::{PoisonError, RwLock};

use tracing::info;

use super::manager::CacheManager;
use super::store::CacheStats;

pub struct CacheAdmin {
    manager: CacheManager,
    stats: RwLock<CacheStats>,
}

impl CacheAdmin {
    pub fn new(manager: CacheManager) -> Self {
        let stats = manager.stats();
        Self {
            manager,
            stats: RwLock::new(stats),
        }
    }

    /// Statistics as of the last refresh.
    pub fn stats(&self) -> CacheStats {
        self.stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn refresh_stats(&self) -> CacheStats {
        let stats = self.manager.stats();
        *self.stats.write().unwrap_or_else(PoisonError::into_inner) = stats.clone();
        stats
    }

    pub fn clear_all_cache(&self) -> usize {
        let removed = self.manager.clear_all();
        self.refresh_stats();
        removed
    }

    pub fn clear_cache_by_pattern(&self, pattern: &str) -> usize {
        let removed = self.manager.clear(Some(pattern));
        info!(pattern, removed, "Cache entries cleared by pattern");
        self.refresh_stats();
        removed
    }

    /// Sweep expired entries and refresh statistics.
    pub fn prune_expired(&self) -> usize {
        let removed = self.manager.prune_expired();
        self.refresh_stats();
        removed
    }
}
