//! Shared cache backends.
//!
//! The cache is best-effort: transient failures are logged and bypassed,
//! and requests proceed against the primary store. The search
//! coordinator uses it to avoid re-embedding repeated queries.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

#[async_trait]
pub trait Cache: Send + Sync {
    /// Get raw bytes from cache.
    async fn get_bytes(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Set raw bytes in cache with TTL.
    async fn set_bytes(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    /// Delete a value from cache.
    async fn delete(&self, key: &str) -> CacheResult<()>;
}

/// In-process cache for single-node deployments. Entries expire lazily;
/// inserts past the capacity trigger a sweep of expired entries first,
/// then evict arbitrary entries to make room.
pub struct MemoryCache {
    entries: dashmap::DashMap<String, (Vec<u8>, std::time::Instant)>,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: dashmap::DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    fn evict_if_full(&self) {
        if self.entries.len() < self.max_entries {
            return;
        }
        let now = std::time::Instant::now();
        self.entries.retain(|_, (_, expires)| *expires > now);
        while self.entries.len() >= self.max_entries {
            let Some(key) = self.entries.iter().next().map(|e| e.key().clone()) else {
                break;
            };
            self.entries.remove(&key);
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get_bytes(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        match self.entries.get(key) {
            Some(entry) if entry.1 > std::time::Instant::now() => Ok(Some(entry.0.clone())),
            Some(_) => {
                drop(self.entries.remove(key));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_bytes(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        self.evict_if_full();
        self.entries.insert(
            key.to_string(),
            (value.to_vec(), std::time::Instant::now() + ttl),
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Redis cache for multi-node deployments.
#[cfg(feature = "redis")]
pub struct RedisCache {
    conn: redis::aio::MultiplexedConnection,
}

#[cfg(feature = "redis")]
impl RedisCache {
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url).map_err(|e| CacheError::Backend(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl Cache for RedisCache {
    async fn get_bytes(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn set_bytes(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(())
    }
}

/// Build a cache from configuration. `None` when caching is disabled.
pub async fn from_config(
    config: &crate::config::CacheConfig,
) -> CacheResult<Option<std::sync::Arc<dyn Cache>>> {
    use crate::config::CacheConfig;
    match config {
        CacheConfig::None => Ok(None),
        CacheConfig::Memory => Ok(Some(std::sync::Arc::new(MemoryCache::new(10_000)))),
        #[cfg(feature = "redis")]
        CacheConfig::Redis(cfg) => Ok(Some(std::sync::Arc::new(
            RedisCache::connect(&cfg.url).await?,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_cache_round_trips_with_ttl() {
        let cache = MemoryCache::new(16);
        cache
            .set_bytes("k", b"v", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get_bytes("k").await.unwrap(), Some(b"v".to_vec()));

        cache.delete("k").await.unwrap();
        assert_eq!(cache.get_bytes("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_cache_expires_entries() {
        let cache = MemoryCache::new(16);
        cache
            .set_bytes("k", b"v", Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.get_bytes("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_cache_bounds_entry_count() {
        let cache = MemoryCache::new(4);
        for i in 0..20 {
            cache
                .set_bytes(&format!("k{}", i), b"v", Duration::from_secs(60))
                .await
                .unwrap();
        }
        assert!(cache.entries.len() <= 5);
    }
}
