//! Frequency-aware admission cache for counter values.
//!
//! A bounded in-process map from counter key to the most recently observed
//! count. Admission and eviction are frequency-based (TinyLFU), so hot keys
//! survive under pressure and a cache hit lets the decision engine deny
//! over-limit traffic without a Redis round trip. Entries live at most one
//! counting window, which bounds how long a cached count can outlive the
//! counter it observed; within that bound staleness is acceptable and
//! correctness never depends on the cache, only throughput does.

use moka::sync::Cache;
use std::time::Duration;
use tracing::debug;

use crate::config::CacheSettings;
use crate::metrics;

/// Bounded cache of last-observed counter values.
pub struct AdmissionCache {
    entries: Cache<String, u64>,
}

impl AdmissionCache {
    /// Create a cache with the configured cost budget. Each entry has unit
    /// cost; entries expire `window` after insertion so a cached count never
    /// outlives its counter by more than one window.
    pub fn new(settings: &CacheSettings, window: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(settings.max_cost)
            .time_to_live(window)
            .eviction_listener(|key, count, cause| {
                debug!(key = %key, count, cause = ?cause, "admission cache entry evicted");
                metrics::record_cache_eviction();
            })
            .build();

        Self { entries }
    }

    /// Look up the most recently recorded count for a counter key.
    pub fn get(&self, key: &str) -> Option<u64> {
        self.entries.get(key)
    }

    /// Offer a counter observation for caching. Admission under pressure is
    /// up to the frequency sketch.
    pub fn insert(&self, key: &str, count: u64) {
        self.entries.insert(key.to_string(), count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cache(window: Duration) -> AdmissionCache {
        AdmissionCache::new(&CacheSettings { max_cost: 1024 }, window)
    }

    #[test]
    fn test_miss_returns_none() {
        let cache = test_cache(Duration::from_secs(60));
        assert_eq!(cache.get("ip:10.0.0.1"), None);
    }

    #[test]
    fn test_insert_and_get() {
        let cache = test_cache(Duration::from_secs(60));
        cache.insert("ip:10.0.0.1", 7);
        assert_eq!(cache.get("ip:10.0.0.1"), Some(7));
    }

    #[test]
    fn test_insert_replaces_count() {
        let cache = test_cache(Duration::from_secs(60));
        cache.insert("user:u-1", 1);
        cache.insert("user:u-1", 99);
        assert_eq!(cache.get("user:u-1"), Some(99));
    }

    #[tokio::test]
    async fn test_entries_expire_after_window() {
        let cache = test_cache(Duration::from_millis(30));
        cache.insert("company:acme", 10_000);

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(cache.get("company:acme"), None);
    }
}
