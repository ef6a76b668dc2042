use super::collection::Collection;
use super::record::Record;
use crate::error::Result;
use crate::utils::local_storage::LocalStorage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const CACHE_KEY_PREFIX: &str = "cache_";
pub const DEFAULT_TTL: Duration = Duration::from_secs(300); // 5 minutes

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match (now - self.timestamp).to_std() {
            Ok(age) => age < ttl,
            // Stamped in the future (clock moved back): don't trust it.
            Err(_) => false,
        }
    }
}

/// Read-through memo of `get` results, kept in local storage.
pub struct ResponseCache {
    storage: Arc<LocalStorage>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(storage: Arc<LocalStorage>, ttl: Duration) -> Self {
        Self { storage, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh records under `key`. Stale or unreadable entries are dropped
    /// from storage on the way out.
    pub fn get(&self, key: &str) -> Option<Vec<Record>> {
        let stored_at = storage_key(key);
        let raw = self.storage.get(&stored_at)?;
        let entry: CacheEntry = match serde_json::from_value(raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Unreadable cache entry for {}: {}", key, e);
                self.evict(&stored_at);
                return None;
            }
        };
        if !entry.is_fresh(self.ttl, Utc::now()) {
            debug!("Cache expired for {}", key);
            self.evict(&stored_at);
            return None;
        }
        match serde_json::from_value(entry.data) {
            Ok(records) => {
                debug!("Cache hit for {}", key);
                Some(records)
            }
            Err(e) => {
                debug!("Cached payload for {} no longer parses: {}", key, e);
                self.evict(&stored_at);
                None
            }
        }
    }

    pub fn insert(&self, key: &str, records: &[Record]) -> Result<()> {
        let entry = CacheEntry::new(serde_json::to_value(records)?);
        self.storage.set(&storage_key(key), serde_json::to_value(entry)?)
    }

    /// Drops every cached read of `collection`, whatever its parameters.
    pub fn invalidate(&self, collection: Collection) -> Result<usize> {
        let bare = storage_key(collection.as_str());
        let with_params = format!("{}?", bare);
        let removed = self
            .storage
            .remove_where(|k| k == bare || k.starts_with(&with_params))?;
        debug!("Invalidated {} cache entries for {}", removed, collection);
        Ok(removed)
    }

    fn evict(&self, stored_at: &str) {
        if let Err(e) = self.storage.remove(stored_at) {
            warn!("Could not drop cache entry {}: {}", stored_at, e);
        }
    }

    pub fn clear(&self) -> Result<usize> {
        self.storage.remove_where(|k| k.starts_with(CACHE_KEY_PREFIX))
    }
}

fn storage_key(key: &str) -> String {
    format!("{}{}", CACHE_KEY_PREFIX, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::query::Query;
    use serde_json::json;

    fn cache(ttl: Duration) -> ResponseCache {
        ResponseCache::new(Arc::new(LocalStorage::in_memory()), ttl)
    }

    fn sample() -> Vec<Record> {
        vec![Record::new(json!({"title": "Flood warning"}).as_object().cloned().unwrap())]
    }

    #[test]
    fn entry_freshness_follows_ttl() {
        let entry = CacheEntry::new(json!([]));
        let ttl = Duration::from_secs(300);
        assert!(entry.is_fresh(ttl, entry.timestamp + chrono::Duration::seconds(299)));
        assert!(!entry.is_fresh(ttl, entry.timestamp + chrono::Duration::seconds(300)));
        assert!(!entry.is_fresh(ttl, entry.timestamp - chrono::Duration::seconds(1)));
    }

    #[test]
    fn returns_what_was_stored() {
        let cache = cache(DEFAULT_TTL);
        let records = sample();
        cache.insert("news", &records).unwrap();
        assert_eq!(cache.get("news"), Some(records));
    }

    #[test]
    fn zero_ttl_always_misses() {
        let cache = cache(Duration::ZERO);
        cache.insert("news", &sample()).unwrap();
        assert_eq!(cache.get("news"), None);
    }

    #[test]
    fn stale_entries_leave_storage_when_read() {
        let storage = Arc::new(LocalStorage::in_memory());
        let cache = ResponseCache::new(storage.clone(), Duration::ZERO);
        cache.insert("news", &sample()).unwrap();
        assert!(storage.get("cache_news").is_some());

        assert_eq!(cache.get("news"), None);
        assert!(storage.get("cache_news").is_none());
    }

    #[test]
    fn unreadable_entries_are_dropped() {
        let storage = Arc::new(LocalStorage::in_memory());
        storage.set("cache_ads", json!("not an entry")).unwrap();
        let cache = ResponseCache::new(storage.clone(), DEFAULT_TTL);

        assert_eq!(cache.get("ads"), None);
        assert!(storage.get("cache_ads").is_none());
    }

    #[test]
    fn invalidation_is_per_collection() {
        let cache = cache(DEFAULT_TTL);
        let searched = Query::new().with_search("flood").cache_key(Collection::News);
        cache.insert("news", &sample()).unwrap();
        cache.insert(&searched, &sample()).unwrap();
        cache.insert("ads", &sample()).unwrap();

        assert_eq!(cache.invalidate(Collection::News).unwrap(), 2);
        assert!(cache.get("news").is_none());
        assert!(cache.get(&searched).is_none());
        assert!(cache.get("ads").is_some());
    }
}
