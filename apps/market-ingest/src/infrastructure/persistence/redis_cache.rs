//! Redis Cache Adapter
//!
//! `KeyValueCache` over a multiplexed async Redis connection. The connection
//! handle is cheap to clone and safe to share across tasks.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use crate::application::ports::{CacheError, KeyValueCache};

fn backend(error: &redis::RedisError) -> CacheError {
    CacheError::Backend {
        message: error.to_string(),
    }
}

/// Redis-backed cache.
#[derive(Clone)]
pub struct RedisCache {
    connection: MultiplexedConnection,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Connect to `url` (`redis://host:port/db`).
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Backend` if the URL is invalid or the server is
    /// unreachable.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|e| backend(&e))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| backend(&e))?;
        tracing::info!("Connected to Redis");
        Ok(Self { connection })
    }
}

/// Expiry in milliseconds, at least one.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl KeyValueCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut connection = self.connection.clone();
        connection
            .get::<_, Option<String>>(key)
            .await
            .map_err(|e| backend(&e))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut connection = self.connection.clone();
        match ttl {
            Some(ttl) => connection
                .pset_ex::<_, _, ()>(key, value, ttl_millis(ttl))
                .await
                .map_err(|e| backend(&e)),
            None => connection
                .set::<_, _, ()>(key, value)
                .await
                .map_err(|e| backend(&e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut connection = self.connection.clone();
        connection
            .del::<_, ()>(key)
            .await
            .map_err(|e| backend(&e))
    }
}
