use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc, time::Duration};
use thiserror::Error;

pub mod memory;
pub mod redis_store;

pub use memory::{Clock, ManualClock, MemoryCacheStore, SystemClock};
pub use redis_store::{RedisCacheStore, RedisTimeouts};

/// Time-to-live applied to every entry written by the resolver.
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// URL scheme selecting the in-process store instead of Redis.
pub const MEMORY_URL: &str = "memory://";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache transport error: {0}")]
    Transport(String),
}

/// Client for the shared key/value store that backs the weather cache.
///
/// Implementations hold only a connection handle; per-key atomicity is the
/// store's job.
#[async_trait]
pub trait CacheStore: Send + Sync + Debug {
    /// `Ok(None)` when the key is absent or expired. Errors mean the store
    /// could not be reached.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Unconditionally overwrites `key`, expiring it after `ttl`.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}

/// Open a store from a URL: `memory://` for the in-process store, anything
/// else is handed to the Redis client with the given timeouts.
pub async fn store_from_url(
    url: &str,
    timeouts: RedisTimeouts,
) -> Result<Arc<dyn CacheStore>, CacheError> {
    if url == MEMORY_URL {
        return Ok(Arc::new(MemoryCacheStore::new()));
    }

    let store = RedisCacheStore::connect_with(url, timeouts).await?;
    Ok(Arc::new(store))
}
