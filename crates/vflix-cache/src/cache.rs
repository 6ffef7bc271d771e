//! Cache abstraction.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::CachePolicy;
use crate::error::CacheResult;

/// Key/value store for rendered responses.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store `value`. `None` uses the cache's default lifetime.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()>;

    /// Drop every entry and return how many were removed.
    async fn clear(&self) -> CacheResult<u64>;
}

/// Apply `policy` after a change to the asset set.
pub async fn invalidate(cache: &dyn ResponseCache, policy: CachePolicy) -> CacheResult<u64> {
    match policy {
        CachePolicy::Full => {
            let removed = cache.clear().await?;
            info!(removed, "Cleared response cache");
            Ok(removed)
        }
        CachePolicy::None => {
            debug!("Cache invalidation disabled");
            Ok(0)
        }
    }
}
