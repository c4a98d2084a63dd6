//! Key-Value Cache Port (Driven Port)
//!
//! String key-value storage with optional expiry. Watermarks, snapshots and
//! the active ticker list all live behind this port.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Key-value cache error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The backing store failed or is unreachable.
    #[error("cache backend error: {message}")]
    Backend {
        /// Error details.
        message: String,
    },

    /// A stored value could not be interpreted.
    #[error("invalid cached value for {key}: {message}")]
    InvalidValue {
        /// Offending key.
        key: String,
        /// Error details.
        message: String,
    },
}

/// Port for the key-value cache.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Write a value. `None` TTL persists indefinitely.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Remove a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Read and deserialize a JSON value.
///
/// # Errors
///
/// Returns `CacheError::InvalidValue` if the stored value is not valid JSON
/// for `T`, or any backend error.
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn KeyValueCache,
    key: &str,
) -> Result<Option<T>, CacheError> {
    let Some(raw) = cache.get(key).await? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| CacheError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })
}

/// Serialize and write a JSON value.
///
/// # Errors
///
/// Returns any backend error.
pub async fn set_json<T: Serialize + Sync>(
    cache: &dyn KeyValueCache,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), CacheError> {
    let raw = serde_json::to_string(value).map_err(|e| CacheError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    cache.set(key, &raw, ttl).await
}

// =============================================================================
// In-Memory Implementation
// =============================================================================

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-memory implementation of `KeyValueCache`.
///
/// Expired entries are hidden on read and purged on the next write.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    /// Whether the cache holds no live keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        entries.retain(|_, e| !e.is_expired(now));
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.get("k").await.unwrap(), None);

        cache.set("k", "v", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(cache.len(), 1);

        cache.delete("k").await.unwrap();
        assert!(cache.is_empty());
        cache.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn ttl_expires() {
        let cache = InMemoryCache::new();
        cache
            .set("k", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(cache.get("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn json_helpers() {
        let cache = InMemoryCache::new();
        set_json(&cache, "list", &vec![1, 2, 3], None).await.unwrap();
        let list: Option<Vec<i32>> = get_json(&cache, "list").await.unwrap();
        assert_eq!(list, Some(vec![1, 2, 3]));

        cache.set("bad", "{not json", None).await.unwrap();
        let err = get_json::<Vec<i32>>(&cache, "bad").await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidValue { .. }));
    }
}
