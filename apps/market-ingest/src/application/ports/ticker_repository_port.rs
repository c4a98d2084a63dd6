//! Ticker Repository Port (Driven Port)

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::cache_port::CacheError;
use crate::domain::Ticker;

/// Ticker repository error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TickerRepositoryError {
    /// Underlying storage failed.
    #[error("ticker storage error: {0}")]
    Storage(#[from] CacheError),
}

/// Port for ticker persistence.
///
/// Tickers are never deleted; only the active flag changes after insert.
#[async_trait]
pub trait TickerRepository: Send + Sync {
    /// All known tickers, ordered by symbol.
    async fn list(&self) -> Result<Vec<Ticker>, TickerRepositoryError>;

    /// Look up one ticker.
    async fn get(&self, symbol: &str) -> Result<Option<Ticker>, TickerRepositoryError>;

    /// Insert tickers whose symbol is not yet known. Returns the insert count.
    async fn insert_many(&self, tickers: &[Ticker]) -> Result<usize, TickerRepositoryError>;

    /// Flip the active flag. Returns `false` if the symbol is unknown.
    async fn set_active(&self, symbol: &str, active: bool) -> Result<bool, TickerRepositoryError>;
}

/// Insert `tickers` into `registry`, skipping known symbols.
pub(crate) fn merge_new(registry: &mut BTreeMap<String, Ticker>, tickers: &[Ticker]) -> usize {
    let mut inserted = 0;
    for ticker in tickers {
        if !registry.contains_key(&ticker.symbol) {
            registry.insert(ticker.symbol.clone(), ticker.clone());
            inserted += 1;
        }
    }
    inserted
}

// =============================================================================
// In-Memory Implementation
// =============================================================================

/// In-memory implementation of `TickerRepository`.
#[derive(Debug, Default)]
pub struct InMemoryTickerRepository {
    tickers: RwLock<BTreeMap<String, Ticker>>,
}

impl InMemoryTickerRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository pre-populated with tickers.
    #[must_use]
    pub fn with_tickers(tickers: impl IntoIterator<Item = Ticker>) -> Self {
        Self {
            tickers: RwLock::new(
                tickers
                    .into_iter()
                    .map(|t| (t.symbol.clone(), t))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl TickerRepository for InMemoryTickerRepository {
    async fn list(&self) -> Result<Vec<Ticker>, TickerRepositoryError> {
        Ok(self.tickers.read().values().cloned().collect())
    }

    async fn get(&self, symbol: &str) -> Result<Option<Ticker>, TickerRepositoryError> {
        Ok(self.tickers.read().get(symbol).cloned())
    }

    async fn insert_many(&self, tickers: &[Ticker]) -> Result<usize, TickerRepositoryError> {
        Ok(merge_new(&mut self.tickers.write(), tickers))
    }

    async fn set_active(&self, symbol: &str, active: bool) -> Result<bool, TickerRepositoryError> {
        Ok(self
            .tickers
            .write()
            .get_mut(symbol)
            .map(|t| t.is_active = active)
            .is_some())
    }
}
