//! Bounded per-user cache of enrichment agents.
//!
//! Backed by `mini_moka`: entries expire `ttl` after they were inserted, and
//! once `capacity` is reached the cache's admission policy decides which
//! entries stay.

use std::time::Duration;

use mini_moka::sync::{Cache, ConcurrentCacheExt};

use crate::error::Result;

pub struct AgentCache<V> {
    inner: Cache<String, V>,
}

impl<V: Clone + Send + Sync + 'static> AgentCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity.max(1) as u64)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Cached value for `key`, if present and not expired.
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.get(&key.to_string())
    }

    pub fn insert(&self, key: &str, value: V) {
        self.inner.insert(key.to_string(), value);
    }

    /// Cached value for `key`, creating and caching it with `create` on a miss.
    pub fn get_or_try_insert_with<F>(&self, key: &str, create: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = create()?;
        self.insert(key, value.clone());
        tracing::debug!(key = %key, "agent cached");
        Ok(value)
    }

    pub fn remove(&self, key: &str) -> bool {
        let key = key.to_string();
        let present = self.inner.contains_key(&key);
        self.inner.invalidate(&key);
        present
    }

    /// Live entry count after pending evictions are applied.
    pub fn len(&self) -> usize {
        self.inner.sync();
        self.inner.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn capacity_bounds_entries() {
        let cache = AgentCache::new(2, HOUR);
        for (i, key) in ["a", "b", "c", "d"].into_iter().enumerate() {
            cache.insert(key, i);
        }
        assert!(cache.len() <= 2);
    }

    #[test]
    fn expired_entries_are_dropped() {
        let cache = AgentCache::new(4, Duration::from_millis(1));
        cache.insert("a", 1);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn creates_once_per_key() {
        let cache = AgentCache::new(4, HOUR);
        let mut calls = 0;
        for _ in 0..3 {
            let v = cache
                .get_or_try_insert_with("u1", || {
                    calls += 1;
                    Ok("agent")
                })
                .unwrap();
            assert_eq!(v, "agent");
        }
        assert_eq!(calls, 1);
        assert!(cache.remove("u1"));
        assert!(!cache.remove("u1"));
    }

    #[test]
    fn creation_errors_are_not_cached() {
        let cache: AgentCache<u8> = AgentCache::new(4, HOUR);
        assert!(cache
            .get_or_try_insert_with("u1", || Err(Error::Config("no model".into())))
            .is_err());
        assert!(cache.is_empty());
    }
}
