//! In-process response cache with per-entry expiry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cache::ResponseCache;
use crate::error::{CacheError, CacheResult};

#[derive(Debug)]
pub struct InMemoryResponseCache {
    entries: RwLock<HashMap<String, (Vec<u8>, Instant)>>,
    default_ttl: Duration,
    failing_clears: AtomicU32,
}

impl Default for InMemoryResponseCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(15 * 60))
    }
}

impl InMemoryResponseCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            failing_clears: AtomicU32::new(0),
        }
    }

    /// Fail the next `n` clear calls.
    pub fn fail_next_clears(&self, n: u32) {
        self.failing_clears.store(n, Ordering::SeqCst);
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|(_, expires)| *expires > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn cleanup_expired(&self) {
        let now = Instant::now();
        self.entries.write().await.retain(|_, (_, expires)| *expires > now);
    }
}

#[async_trait]
impl ResponseCache for InMemoryResponseCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let hit = self
            .entries
            .read()
            .await
            .get(key)
            .filter(|(_, expires)| *expires > now)
            .map(|(value, _)| value.clone());
        Ok(hit)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        self.cleanup_expired().await;
        let expires = Instant::now() + ttl.unwrap_or(self.default_ttl);
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value, expires));
        Ok(())
    }

    async fn clear(&self) -> CacheResult<u64> {
        let failing = self
            .failing_clears
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CacheError::Unavailable("in-memory cache rejecting clears".to_string()));
        }

        let mut entries = self.entries.write().await;
        let removed = entries.len() as u64;
        entries.clear();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::invalidate;
    use crate::config::CachePolicy;

    #[tokio::test]
    async fn test_set_get_clear() {
        let cache = InMemoryResponseCache::default();
        cache.set("videos:list", b"[]".to_vec(), None).await.unwrap();
        assert_eq!(cache.get("videos:list").await.unwrap(), Some(b"[]".to_vec()));

        assert_eq!(cache.clear().await.unwrap(), 1);
        assert_eq!(cache.get("videos:list").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = InMemoryResponseCache::default();
        cache
            .set("videos:list", b"[]".to_vec(), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("videos:list").await.unwrap(), None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_policy_none_keeps_entries() {
        let cache = InMemoryResponseCache::default();
        cache.set("k", b"v".to_vec(), None).await.unwrap();

        assert_eq!(invalidate(&cache, CachePolicy::None).await.unwrap(), 0);
        assert_eq!(cache.len().await, 1);

        assert_eq!(invalidate(&cache, CachePolicy::Full).await.unwrap(), 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_failing_clear() {
        let cache = InMemoryResponseCache::default();
        cache.fail_next_clears(1);
        assert!(matches!(cache.clear().await, Err(CacheError::Unavailable(_))));
        assert!(cache.clear().await.is_ok());
    }

    #[test]
    fn test_usable_outside_runtime() {
        let cache = InMemoryResponseCache::default();
        tokio_test::block_on(async {
            tokio_test::assert_ok!(cache.set("k", b"v".to_vec(), None).await);
            assert_eq!(tokio_test::assert_ok!(cache.clear().await), 1);
        });
    }
}
