//! Result caching for the analysis service
//!
//! The service talks to an injected [`AnalysisCache`]; [`TtlCache`] is the
//! in-process implementation with time-based expiry and explicit invalidation.
//! Expired entries are swept on every insert, so the map never holds more than
//! the entries written within one TTL.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

/// Key-value cache shared across analysis requests
pub trait AnalysisCache<K, V>: Send + Sync {
    /// Live entry for `key`, if any
    fn get(&self, key: &K) -> Option<V>;
    fn insert(&self, key: K, value: V);
    /// Remove `key`. Returns true when an entry was present.
    fn invalidate(&self, key: &K) -> bool;
    fn clear(&self);
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// In-memory cache whose entries expire `ttl` after insertion
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of unexpired entries
    pub fn len(&self) -> usize {
        let entries = self.entries.read();
        entries
            .values()
            .filter(|e| e.inserted_at.elapsed() < self.ttl)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.inserted_at.elapsed() < self.ttl);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "purged expired cache entries");
        }
        removed
    }
}

impl<K, V> AnalysisCache<K, V> for TtlCache<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|e| e.inserted_at.elapsed() < self.ttl)
            .map(|e| e.value.clone())
    }

    fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write();
        entries.retain(|_, e| e.inserted_at.elapsed() < self.ttl);
        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    fn invalidate(&self, key: &K) -> bool {
        self.entries.write().remove(key).is_some()
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_insert_invalidate() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60));
        assert!(cache.get(&"AAPL".to_string()).is_none());

        cache.insert("AAPL".to_string(), 7);
        assert_eq!(cache.get(&"AAPL".to_string()), Some(7));
        assert_eq!(cache.len(), 1);

        assert!(cache.invalidate(&"AAPL".to_string()));
        assert!(!cache.invalidate(&"AAPL".to_string()));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::ZERO);
        cache.insert("MSFT", 1);
        assert!(cache.get(&"MSFT").is_none());
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.purge_expired(), 0);
    }

    #[test]
    fn test_expired_entries_dropped_on_insert() {
        let cache: TtlCache<u32, u32> = TtlCache::new(Duration::ZERO);
        for i in 0..1000 {
            cache.insert(i, i);
        }
        // Only the last insert can still be in the map
        assert!(cache.entries.read().len() <= 1);
        assert!(cache.purge_expired() <= 1);
    }

    #[test]
    fn test_clear() {
        let cache: TtlCache<u8, u8> = TtlCache::new(Duration::from_secs(60));
        cache.insert(1, 1);
        cache.insert(2, 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
