//! Feed ranking cache layer
//!
//! The ranking engine only relies on a small time-bound memoization contract:
//! - `get` / `set` with a TTL / `del`
//! - atomic counters (`incr`) for interaction tallies
//!
//! Two implementations are provided:
//! - [`RedisCache`]: shared Redis, TTL jitter to avoid synchronized expiry
//! - [`InMemoryCache`]: process-local, used by tests and single-node setups

mod error;
mod keys;
mod memory;
mod metrics;

pub use error::{CacheError, CacheResult};
pub use keys::{CacheKey, CACHE_VERSION};
pub use memory::InMemoryCache;
pub use metrics::{CacheEntity, CacheMetrics, CacheOp};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Shared Redis connection manager
pub type SharedRedis = Arc<Mutex<ConnectionManager>>;

/// Default TTL values (seconds)
pub mod ttl {
    pub const SESSION: u64 = 2 * 60 * 60; // 2 hours idle
    pub const POST_INTERACTIONS: u64 = 6 * 60 * 60; // 6 hours
    pub const AUTHOR_INTERACTIONS: u64 = 30 * 24 * 60 * 60; // 30 days
    pub const FEED_PAGE: u64 = 300; // 5 minutes
    pub const IMPRESSIONS: u64 = 7 * 24 * 60 * 60; // 7 days
    pub const BEHAVIOR_PROFILE: u64 = 3600; // 1 hour
    pub const RETENTION: u64 = 1800; // 30 minutes
}

/// Core cache contract.
///
/// Values are opaque strings so the trait stays object-safe; typed access goes
/// through [`JsonCache`].
#[async_trait]
pub trait CacheOperations: Send + Sync {
    /// Get a raw value
    async fn get_raw(&self, key: &str) -> CacheResult<Option<String>>;

    /// Set a raw value with TTL
    async fn set_raw(&self, key: &str, value: String, ttl_secs: u64) -> CacheResult<()>;

    /// Delete a key
    async fn del(&self, key: &str) -> CacheResult<()>;

    /// Atomically add `delta` to an integer counter, (re)arming its TTL.
    /// Missing counters start at zero. Returns the new value.
    async fn incr(&self, key: &str, delta: i64, ttl_secs: u64) -> CacheResult<i64>;
}

/// Typed JSON access on top of any [`CacheOperations`].
#[async_trait]
pub trait JsonCache: CacheOperations {
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.get_raw(key).await? {
            Some(data) => match serde_json::from_str::<T>(&data) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    warn!(key = %key, error = %e, "Cache deserialization failed");
                    // Corrupted entry, drop it and report a miss
                    let _ = self.del(key).await;
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> CacheResult<()> {
        let data = serde_json::to_string(value)?;
        self.set_raw(key, data, ttl_secs).await
    }
}

impl<C: CacheOperations + ?Sized> JsonCache for C {}

/// Redis-backed cache
#[derive(Clone)]
pub struct RedisCache {
    redis: SharedRedis,
    metrics: CacheMetrics,
}

impl RedisCache {
    pub fn new(redis: SharedRedis) -> Self {
        Self {
            redis,
            metrics: CacheMetrics::new(),
        }
    }

    /// Connect to Redis and wrap the connection manager
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::new(Arc::new(Mutex::new(manager))))
    }

    /// Add jitter to TTL to prevent thundering herd
    fn add_jitter(ttl_secs: u64) -> u64 {
        let jitter_percent = (rand::random::<u32>() % 10) as f64 / 100.0;
        let jitter = (ttl_secs as f64 * jitter_percent).round() as u64;
        ttl_secs + jitter
    }
}

#[async_trait]
impl CacheOperations for RedisCache {
    async fn get_raw(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.redis.lock().await;
        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(data)) => {
                debug!(key = %key, "Cache hit");
                self.metrics.record_lookup(key, true);
                Ok(Some(data))
            }
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                self.metrics.record_lookup(key, false);
                Ok(None)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Redis get error");
                self.metrics.record_error(key, CacheOp::Get);
                Err(CacheError::Redis(e))
            }
        }
    }

    async fn set_raw(&self, key: &str, value: String, ttl_secs: u64) -> CacheResult<()> {
        let ttl_with_jitter = Self::add_jitter(ttl_secs);

        let mut conn = self.redis.lock().await;
        conn.set_ex::<_, _, ()>(key, value, ttl_with_jitter)
            .await
            .map_err(|e| {
                self.metrics.record_error(key, CacheOp::Set);
                CacheError::Redis(e)
            })?;

        debug!(key = %key, ttl = ttl_with_jitter, "Cache set");
        self.metrics.record_mutation(key, CacheOp::Set);
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.redis.lock().await;
        conn.del::<_, ()>(key).await.map_err(|e| {
            self.metrics.record_error(key, CacheOp::Del);
            CacheError::Redis(e)
        })?;

        debug!(key = %key, "Cache delete");
        self.metrics.record_mutation(key, CacheOp::Del);
        Ok(())
    }

    async fn incr(&self, key: &str, delta: i64, ttl_secs: u64) -> CacheResult<i64> {
        let mut conn = self.redis.lock().await;
        let (value,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, delta)
            .expire(key, ttl_secs as i64)
            .ignore()
            .query_async(&mut *conn)
            .await
            .map_err(|e| {
                self.metrics.record_error(key, CacheOp::Incr);
                CacheError::Redis(e)
            })?;

        self.metrics.record_mutation(key, CacheOp::Incr);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_add_jitter() {
        let ttl = 300u64;
        let with_jitter = RedisCache::add_jitter(ttl);
        // Jitter should be 0-10% of TTL
        assert!(with_jitter >= ttl);
        assert!(with_jitter <= ttl + (ttl / 10));
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn test_json_roundtrip_through_trait_object() {
        let cache: Arc<dyn CacheOperations> = Arc::new(InMemoryCache::new());
        let sample = Sample {
            name: "a".to_string(),
            count: 3,
        };

        cache.set_json("v1:test:1", &sample, 60).await.unwrap();
        let loaded: Option<Sample> = cache.get_json("v1:test:1").await.unwrap();
        assert_eq!(loaded, Some(sample));
    }

    #[tokio::test]
    async fn test_corrupted_json_is_dropped() {
        let cache = InMemoryCache::new();
        cache
            .set_raw("v1:test:bad", "not json".to_string(), 60)
            .await
            .unwrap();

        let loaded: Option<Sample> = cache.get_json("v1:test:bad").await.unwrap();
        assert!(loaded.is_none());
        assert!(cache.get_raw("v1:test:bad").await.unwrap().is_none());
    }
}
