//! Key-value cache backends: Redis when configured, otherwise an in-process map.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;

use crate::config::CacheConfig;

const REDIS_TIMEOUT: Duration = Duration::from_millis(500);

#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> anyhow::Result<()>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
    /// Releases connections; called once at shutdown.
    async fn close(&self) {}
}

pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    pub fn connect(url: &str) -> anyhow::Result<Self> {
        let mut cfg = deadpool_redis::Config::from_url(url);
        let mut pool_config = cfg.pool.take().unwrap_or_default();
        pool_config.timeouts.wait = Some(REDIS_TIMEOUT);
        pool_config.timeouts.create = Some(REDIS_TIMEOUT);
        pool_config.timeouts.recycle = Some(REDIS_TIMEOUT);
        cfg.pool = Some(pool_config);
        let pool = cfg
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .context("create redis pool")?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl CacheClient for RedisCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let mut conn = self.pool.get().await.context("redis connection")?;
        let value = conn.get::<_, Option<Vec<u8>>>(key).await.context("redis GET")?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> anyhow::Result<()> {
        let mut conn = self.pool.get().await.context("redis connection")?;
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .context("redis SET EX")?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.pool.get().await.context("redis connection")?;
        conn.del::<_, ()>(key).await.context("redis DEL")?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close();
        tracing::info!("redis pool closed");
    }
}

#[derive(Clone, Debug)]
struct CachedEntry {
    data: Vec<u8>,
    expires_at: Instant,
}

impl CachedEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Single-instance cache: expired entries read as absent and are dropped lazily.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, CachedEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.data.clone()));
            }
        } else {
            return Ok(None);
        }
        self.entries.remove(key);
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> anyhow::Result<()> {
        self.entries.insert(
            key.to_string(),
            CachedEntry {
                data: value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Redis when `REDIS_URL` is set and reachable, the in-process cache otherwise.
pub async fn create_cache_client(config: &CacheConfig) -> Arc<dyn CacheClient> {
    let Some(url) = config.redis_url.as_deref() else {
        tracing::info!("REDIS_URL not set, using local cache only");
        return Arc::new(MemoryCache::new());
    };

    match RedisCache::connect(url) {
        Ok(cache) => {
            if let Err(e) = cache.pool.get().await {
                // Reads fail open, so a Redis outage at startup only costs cache hits.
                tracing::warn!(error = %e, "redis not reachable yet; cache reads will miss until it is");
            } else {
                tracing::info!("connected to redis");
            }
            Arc::new(cache)
        }
        Err(e) => {
            tracing::warn!(error = %e, "invalid redis configuration, falling back to local cache");
            Arc::new(MemoryCache::new())
        }
    }
}
