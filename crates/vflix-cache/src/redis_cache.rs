//! Redis-backed response cache.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::debug;

use crate::cache::ResponseCache;
use crate::config::CacheConfig;
use crate::error::CacheResult;

/// Keys scanned per SCAN round trip.
const SCAN_BATCH: usize = 200;

/// Response cache stored under a key prefix in Redis.
///
/// Clearing only touches keys under the prefix, so the cache can share a
/// database with the job queue.
pub struct RedisResponseCache {
    client: redis::Client,
    config: CacheConfig,
}

impl RedisResponseCache {
    pub fn new(config: CacheConfig) -> CacheResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> CacheResult<Self> {
        Self::new(CacheConfig::from_env())
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    async fn conn(&self) -> CacheResult<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl ResponseCache for RedisResponseCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = conn.get(self.key(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        let ttl = ttl.unwrap_or(self.config.default_ttl).as_secs().max(1);
        conn.set_ex::<_, _, ()>(self.key(key), value, ttl).await?;
        Ok(())
    }

    async fn clear(&self) -> CacheResult<u64> {
        let mut conn = self.conn().await?;
        let pattern = format!("{}*", self.config.key_prefix);
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let n: u64 = conn.del(&keys).await?;
                removed += n;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(removed, prefix = %self.config.key_prefix, "Cleared cache keys");
        Ok(removed)
    }
}
