//! Per-user alias cache
//!
//! Read-through cache in front of the alias store so high-traffic channels
//! don't hit the database on every message. Entries expire on a fixed TTL
//! and are invalidated explicitly whenever a user's aliases or forms change.
//! Last-writer-wins on refresh is fine: the store stays the source of truth.

use moka::future::Cache;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::alias::Alias;

/// Aliases for one user, grouped by owning form.
pub type GroupedAliases = Arc<HashMap<String, Vec<Alias>>>;

/// Default entry lifetime in seconds.
pub const DEFAULT_TTL_SECS: u64 = 300;

/// Cache statistics
#[derive(Debug, Clone)]
pub struct AliasCacheStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate_percent: f64,
}

/// Per-user grouped-alias cache
#[derive(Clone)]
pub struct AliasCache {
    cache: Cache<u64, GroupedAliases>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl AliasCache {
    /// Create a cache with the given entry TTL.
    pub fn new(ttl_secs: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self {
            cache,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cached grouped aliases for a user, if fresh.
    pub async fn get(&self, user_id: u64) -> Option<GroupedAliases> {
        if let Some(grouped) = self.cache.get(&user_id).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Alias cache HIT: user {}", user_id);
            Some(grouped)
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("Alias cache MISS: user {}", user_id);
            None
        }
    }

    /// Store a freshly fetched grouped list.
    pub async fn set(&self, user_id: u64, grouped: GroupedAliases) {
        self.cache.insert(user_id, grouped).await;
    }

    /// Drop a user's entry. Call after any alias or form mutation so the
    /// next match re-reads the store.
    pub async fn invalidate(&self, user_id: u64) {
        self.cache.invalidate(&user_id).await;
        debug!("Alias cache invalidated: user {}", user_id);
    }

    /// Get cache statistics
    pub fn stats(&self) -> AliasCacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        AliasCacheStats {
            entries: self.cache.entry_count(),
            hits,
            misses,
            hit_rate_percent: if total > 0 {
                (hits as f64 / total as f64) * 100.0
            } else {
                0.0
            },
        }
    }
}

impl Default for AliasCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_SECS)
    }
}
