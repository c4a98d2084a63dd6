//! Ticker Service
//!
//! Symbol discovery and the cached active-ticker list.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{
    CacheError, Crawler, CrawlerError, KeyValueCache, TickerRepository, TickerRepositoryError,
    get_json, set_json,
};
use crate::domain::Ticker;

/// Cache key for the active ticker list.
pub const ACTIVE_TICKERS_KEY: &str = "Ticker:AllTicker:true";

/// Lifetime of the cached active ticker list.
pub const ACTIVE_TICKERS_TTL: Duration = Duration::from_secs(3600);

/// Ticker service error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TickerServiceError {
    /// Registry failure.
    #[error(transparent)]
    Repository(#[from] TickerRepositoryError),

    /// Cache failure.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Upstream symbol listing failed.
    #[error(transparent)]
    Crawler(#[from] CrawlerError),
}

/// Ticker registry use cases.
#[derive(Clone)]
pub struct TickerService {
    repository: Arc<dyn TickerRepository>,
    cache: Arc<dyn KeyValueCache>,
    crawler: Arc<dyn Crawler>,
    default_active: HashSet<String>,
}

impl std::fmt::Debug for TickerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickerService")
            .field("default_active", &self.default_active.len())
            .finish_non_exhaustive()
    }
}

impl TickerService {
    /// Create a new ticker service.
    ///
    /// Newly discovered symbols listed in `default_active` start active.
    #[must_use]
    pub fn new(
        repository: Arc<dyn TickerRepository>,
        cache: Arc<dyn KeyValueCache>,
        crawler: Arc<dyn Crawler>,
        default_active: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            repository,
            cache,
            crawler,
            default_active: default_active.into_iter().collect(),
        }
    }

    /// Look up one ticker.
    ///
    /// # Errors
    ///
    /// Returns registry errors.
    pub async fn get(&self, symbol: &str) -> Result<Option<Ticker>, TickerServiceError> {
        Ok(self.repository.get(symbol).await?)
    }

    /// Active tickers, optionally served from the cache.
    ///
    /// On a cache miss the list is loaded from the registry and cached for
    /// [`ACTIVE_TICKERS_TTL`].
    ///
    /// # Errors
    ///
    /// Returns registry or cache errors.
    pub async fn active_tickers(&self, use_cache: bool) -> Result<Vec<Ticker>, TickerServiceError> {
        if use_cache {
            if let Some(cached) = get_json::<Vec<Ticker>>(self.cache.as_ref(), ACTIVE_TICKERS_KEY).await? {
                return Ok(cached);
            }
        }

        let active: Vec<Ticker> = self
            .repository
            .list()
            .await?
            .into_iter()
            .filter(|t| t.is_active)
            .collect();

        if use_cache {
            set_json(
                self.cache.as_ref(),
                ACTIVE_TICKERS_KEY,
                &active,
                Some(ACTIVE_TICKERS_TTL),
            )
            .await?;
        }
        Ok(active)
    }

    /// Active symbols only.
    ///
    /// # Errors
    ///
    /// Same as [`TickerService::active_tickers`].
    pub async fn active_symbols(&self, use_cache: bool) -> Result<Vec<String>, TickerServiceError> {
        Ok(self
            .active_tickers(use_cache)
            .await?
            .into_iter()
            .map(|t| t.symbol)
            .collect())
    }

    /// Fetch the upstream symbol list and register unknown symbols.
    ///
    /// Returns the number of newly inserted tickers.
    ///
    /// # Errors
    ///
    /// Returns crawler, registry or cache errors.
    pub async fn discover(&self) -> Result<usize, TickerServiceError> {
        let fetched: Vec<Ticker> = self
            .crawler
            .fetch_symbols()
            .await?
            .into_iter()
            .map(|t| {
                let active = self.default_active.contains(&t.symbol);
                t.with_active(active)
            })
            .collect();

        let inserted = self.repository.insert_many(&fetched).await?;
        if inserted > 0 {
            self.cache.delete(ACTIVE_TICKERS_KEY).await?;
        }

        tracing::info!(
            fetched = fetched.len(),
            inserted,
            "Symbol discovery complete"
        );
        Ok(inserted)
    }

    /// Flip a ticker's active flag. Returns `false` for unknown symbols.
    ///
    /// # Errors
    ///
    /// Returns registry or cache errors.
    pub async fn set_active(&self, symbol: &str, active: bool) -> Result<bool, TickerServiceError> {
        let found = self.repository.set_active(symbol, active).await?;
        if found {
            self.cache.delete(ACTIVE_TICKERS_KEY).await?;
            tracing::info!(symbol, active, "Ticker activation changed");
        }
        Ok(found)
    }
}
