//! Key/value cache backend used by the prediction cache gate.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

pub trait PredictionCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    body: Vec<u8>,
    expires_at: Instant,
}

/// Process-local TTL cache. A zero TTL disables it.
#[derive(Debug)]
pub struct InMemoryPredictionCache {
    map: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl InMemoryPredictionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn is_disabled(&self) -> bool {
        self.ttl == Duration::ZERO
    }

    /// Number of entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.map.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear_expired(&self) -> Result<()> {
        let now = Instant::now();
        let mut map = self
            .map
            .write()
            .map_err(|_| anyhow!("prediction cache lock poisoned"))?;
        map.retain(|_, entry| entry.expires_at > now);
        Ok(())
    }
}

impl PredictionCache for InMemoryPredictionCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let map = self
            .map
            .read()
            .map_err(|_| anyhow!("prediction cache lock poisoned"))?;
        Ok(map.get(key).and_then(|entry| {
            if Instant::now() <= entry.expires_at {
                Some(entry.body.clone())
            } else {
                None
            }
        }))
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        if self.is_disabled() {
            return Ok(());
        }
        let mut map = self
            .map
            .write()
            .map_err(|_| anyhow!("prediction cache lock poisoned"))?;
        map.insert(
            key.to_string(),
            CacheEntry {
                body: value,
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_get_set_overwrite() {
        let cache = InMemoryPredictionCache::new(Duration::from_secs(60));
        assert!(cache.get("k").unwrap().is_none());
        cache.set("k", b"v1".to_vec()).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(b"v1".to_vec()));
        cache.set("k", b"v2".to_vec()).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn entries_expire() {
        let cache = InMemoryPredictionCache::new(Duration::from_millis(20));
        cache.set("k", b"v".to_vec()).unwrap();
        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get("k").unwrap().is_none());
        cache.clear_expired().unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let cache = InMemoryPredictionCache::disabled();
        cache.set("k", b"v".to_vec()).unwrap();
        assert!(cache.get("k").unwrap().is_none());
        assert_eq!(cache.len(), 0);
    }
}
