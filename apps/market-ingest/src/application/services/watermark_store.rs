//! Watermark Store
//!
//! Per-(symbol, resolution) "last ingested timestamp" in the key-value cache.
//! `set` is last-writer-wins; callers compare before writing.

use std::sync::Arc;

use crate::application::ports::{CacheError, KeyValueCache};
use crate::domain::Resolution;

/// Watermark persistence over the key-value cache.
#[derive(Clone)]
pub struct WatermarkStore {
    cache: Arc<dyn KeyValueCache>,
}

impl std::fmt::Debug for WatermarkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkStore").finish_non_exhaustive()
    }
}

impl WatermarkStore {
    /// Create a store backed by `cache`.
    #[must_use]
    pub fn new(cache: Arc<dyn KeyValueCache>) -> Self {
        Self { cache }
    }

    /// Cache key for a watermark.
    #[must_use]
    pub fn key(symbol: &str, resolution: Resolution) -> String {
        format!("LastTimeStamp:{}:{symbol}", resolution.code())
    }

    /// Last accepted bar timestamp (unix seconds), if any.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::InvalidValue` if the stored value is not an
    /// integer, or any backend error.
    pub async fn get(&self, symbol: &str, resolution: Resolution) -> Result<Option<i64>, CacheError> {
        let key = Self::key(symbol, resolution);
        let Some(raw) = self.cache.get(&key).await? else {
            return Ok(None);
        };
        raw.trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|e| CacheError::InvalidValue {
                key,
                message: e.to_string(),
            })
    }

    /// Store a watermark unconditionally, without expiry.
    ///
    /// # Errors
    ///
    /// Returns any backend error.
    pub async fn set(
        &self,
        symbol: &str,
        resolution: Resolution,
        timestamp: i64,
    ) -> Result<(), CacheError> {
        self.cache
            .set(
                &Self::key(symbol, resolution),
                &timestamp.to_string(),
                None,
            )
            .await
    }

    /// Remove a watermark.
    ///
    /// # Errors
    ///
    /// Returns any backend error.
    pub async fn clear(&self, symbol: &str, resolution: Resolution) -> Result<(), CacheError> {
        self.cache.delete(&Self::key(symbol, resolution)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::InMemoryCache;

    fn store() -> (WatermarkStore, Arc<InMemoryCache>) {
        let cache = Arc::new(InMemoryCache::new());
        (WatermarkStore::new(cache.clone()), cache)
    }

    #[test]
    fn key_format() {
        assert_eq!(
            WatermarkStore::key("ABC", Resolution::Daily),
            "LastTimeStamp:D:ABC"
        );
        assert_eq!(
            WatermarkStore::key("ABC", Resolution::Minute60),
            "LastTimeStamp:60:ABC"
        );
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let (store, _) = store();
        assert_eq!(store.get("ABC", Resolution::Daily).await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_is_last_writer_wins() {
        let (store, _) = store();
        store.set("ABC", Resolution::Daily, 200).await.unwrap();
        store.set("ABC", Resolution::Daily, 100).await.unwrap();
        assert_eq!(store.get("ABC", Resolution::Daily).await.unwrap(), Some(100));
        assert_eq!(store.get("ABC", Resolution::Minute1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_removes() {
        let (store, _) = store();
        store.set("ABC", Resolution::Daily, 1).await.unwrap();
        store.clear("ABC", Resolution::Daily).await.unwrap();
        assert_eq!(store.get("ABC", Resolution::Daily).await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_value_is_reported() {
        let (store, cache) = store();
        cache
            .set("LastTimeStamp:D:ABC", "yesterday", None)
            .await
            .unwrap();
        assert!(matches!(
            store.get("ABC", Resolution::Daily).await,
            Err(CacheError::InvalidValue { .. })
        ));
    }
}
