use async_trait::async_trait;
use redis::{
    AsyncCommands,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use std::{fmt, time::Duration};
use tracing::info;

use super::{CacheError, CacheStore};

/// Reconnect attempts after the first failed dial, at startup and after a drop.
const CONNECT_RETRIES: usize = 1;

/// Upper bounds on how long the adapter waits for Redis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedisTimeouts {
    /// Dialing and handshaking a connection.
    pub connection: Duration,
    /// Waiting for the reply to a single command.
    pub response: Duration,
}

impl Default for RedisTimeouts {
    fn default() -> Self {
        Self { connection: Duration::from_secs(5), response: Duration::from_secs(3) }
    }
}

/// Redis-backed store. The connection manager is a cheap clone around one
/// multiplexed connection and reconnects by itself after a drop.
///
/// Every command is bounded by [`RedisTimeouts::response`], so a stalled
/// server shows up as a [`CacheError`] instead of a request that never ends.
#[derive(Clone)]
pub struct RedisCacheStore {
    conn: ConnectionManager,
    url: String,
}

impl RedisCacheStore {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        Self::connect_with(url, RedisTimeouts::default()).await
    }

    pub async fn connect_with(url: &str, timeouts: RedisTimeouts) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(transport)?;
        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(timeouts.connection)
            .set_response_timeout(timeouts.response)
            .set_number_of_retries(CONNECT_RETRIES);
        let conn = ConnectionManager::new_with_config(client, config).await.map_err(transport)?;
        info!(url = %url, ?timeouts, "connected to redis");

        Ok(Self { conn, url: url.to_string() })
    }
}

impl fmt::Debug for RedisCacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCacheStore").field("url", &self.url).finish_non_exhaustive()
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(transport)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.set_ex(key, value, ttl_seconds(ttl)).await.map_err(transport)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await.map_err(transport)?;
        Ok(())
    }
}

/// `SET EX` takes whole seconds and rejects zero.
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

fn transport(err: redis::RedisError) -> CacheError {
    CacheError::Transport(err.to_string())
}
