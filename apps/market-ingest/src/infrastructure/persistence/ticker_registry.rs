//! Cached Ticker Registry
//!
//! `TickerRepository` persisted as one JSON document in the key-value cache.
//! Read-modify-write cycles are serialized per instance.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::application::ports::{
    KeyValueCache, TickerRepository, TickerRepositoryError, get_json, merge_new, set_json,
};
use crate::domain::Ticker;

/// Cache key holding the registry document.
pub const REGISTRY_KEY: &str = "Ticker:Registry";

type Registry = BTreeMap<String, Ticker>;

/// Ticker registry stored in the key-value cache.
pub struct CachedTickerRepository {
    cache: Arc<dyn KeyValueCache>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for CachedTickerRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedTickerRepository")
            .field("key", &REGISTRY_KEY)
            .finish_non_exhaustive()
    }
}

impl CachedTickerRepository {
    /// Create a registry over `cache`.
    #[must_use]
    pub fn new(cache: Arc<dyn KeyValueCache>) -> Self {
        Self {
            cache,
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Registry, TickerRepositoryError> {
        Ok(get_json::<Registry>(self.cache.as_ref(), REGISTRY_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn save(&self, registry: &Registry) -> Result<(), TickerRepositoryError> {
        set_json(self.cache.as_ref(), REGISTRY_KEY, registry, None).await?;
        Ok(())
    }
}

#[async_trait]
impl TickerRepository for CachedTickerRepository {
    async fn list(&self) -> Result<Vec<Ticker>, TickerRepositoryError> {
        Ok(self.load().await?.into_values().collect())
    }

    async fn get(&self, symbol: &str) -> Result<Option<Ticker>, TickerRepositoryError> {
        Ok(self.load().await?.remove(symbol))
    }

    async fn insert_many(&self, tickers: &[Ticker]) -> Result<usize, TickerRepositoryError> {
        let _guard = self.write_lock.lock().await;
        let mut registry = self.load().await?;
        let inserted = merge_new(&mut registry, tickers);
        if inserted > 0 {
            self.save(&registry).await?;
            tracing::info!(inserted, total = registry.len(), "Ticker registry updated");
        }
        Ok(inserted)
    }

    async fn set_active(&self, symbol: &str, active: bool) -> Result<bool, TickerRepositoryError> {
        let _guard = self.write_lock.lock().await;
        let mut registry = self.load().await?;
        let Some(ticker) = registry.get_mut(symbol) else {
            return Ok(false);
        };
        ticker.is_active = active;
        self.save(&registry).await?;
        Ok(true)
    }
}
