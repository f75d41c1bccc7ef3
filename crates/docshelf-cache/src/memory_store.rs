//! In-process cache store: an LRU of values with per-entry expiry plus a
//! map of tag generation counters.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;
use tokio::time::Instant;

use docshelf_core::{CacheStore, Error, Result};

pub struct MemoryCacheStore {
    entries: Mutex<LruCache<String, (String, Instant)>>,
    generations: Mutex<HashMap<String, u64>>,
    unavailable: AtomicBool,
    fail_bumps: AtomicBool,
}

impl MemoryCacheStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            generations: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
            fail_bumps: AtomicBool::new(false),
        }
    }

    /// Simulate an outage: every call fails.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make only `bump_generations` fail.
    pub fn set_fail_bumps(&self, fail: bool) {
        self.fail_bumps.store(fail, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Cache("cache store unavailable".to_string()));
        }
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.pop(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.check_available()?;
        let expires_at = Instant::now() + ttl;
        self.entries
            .lock()
            .await
            .put(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_available()?;
        self.entries.lock().await.pop(key);
        Ok(())
    }

    async fn generations(&self, tags: &[&str]) -> Result<Vec<u64>> {
        self.check_available()?;
        let generations = self.generations.lock().await;
        Ok(tags
            .iter()
            .map(|t| generations.get(*t).copied().unwrap_or(0))
            .collect())
    }

    async fn bump_generations(&self, tags: &[&str]) -> Result<()> {
        self.check_available()?;
        if self.fail_bumps.load(Ordering::SeqCst) {
            return Err(Error::Cache("generation bump failed".to_string()));
        }
        let mut generations = self.generations.lock().await;
        for tag in tags {
            *generations.entry((*tag).to_string()).or_default() += 1;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = MemoryCacheStore::new(8);
        store
            .set("k", "v".to_string(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let store = MemoryCacheStore::new(2);
        let ttl = Duration::from_secs(60);
        store.set("a", "1".into(), ttl).await.unwrap();
        store.set("b", "2".into(), ttl).await.unwrap();
        store.get("a").await.unwrap();
        store.set("c", "3".into(), ttl).await.unwrap();

        assert!(store.get("a").await.unwrap().is_some());
        assert!(store.get("b").await.unwrap().is_none());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_generations() {
        let store = MemoryCacheStore::new(8);
        assert_eq!(store.generations(&["files", "stats"]).await.unwrap(), vec![0, 0]);
        store.bump_generations(&["files"]).await.unwrap();
        store.bump_generations(&["files", "stats"]).await.unwrap();
        assert_eq!(store.generations(&["files", "stats"]).await.unwrap(), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_failure_switches() {
        let store = MemoryCacheStore::new(8);
        store.set_fail_bumps(true);
        assert!(store.bump_generations(&["files"]).await.is_err());
        assert!(store.get("k").await.is_ok());

        store.set_unavailable(true);
        assert!(matches!(store.get("k").await, Err(Error::Cache(_))));
    }
}
