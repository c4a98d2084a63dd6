//! Snapshot Cache
//!
//! Per-symbol quote records in the key-value cache. Periodic bulk pulls
//! replace records wholesale; live updates patch them field by field.

use std::sync::Arc;

use crate::application::ports::{
    CacheError, Crawler, CrawlerError, KeyValueCache, get_json, set_json,
};
use crate::domain::{SnapshotUpdate, StockSnapshot};
use crate::infrastructure::metrics::{self, SnapshotWriteKind};

/// Snapshot cache error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SnapshotError {
    /// Cache failure.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Upstream snapshot pull failed.
    #[error(transparent)]
    Crawler(#[from] CrawlerError),
}

/// Snapshot cache over a `KeyValueCache`.
#[derive(Clone)]
pub struct SnapshotCache {
    cache: Arc<dyn KeyValueCache>,
    crawler: Arc<dyn Crawler>,
}

impl std::fmt::Debug for SnapshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCache").finish_non_exhaustive()
    }
}

impl SnapshotCache {
    /// Create a new snapshot cache.
    #[must_use]
    pub fn new(cache: Arc<dyn KeyValueCache>, crawler: Arc<dyn Crawler>) -> Self {
        Self { cache, crawler }
    }

    /// Cache key for a symbol's record.
    #[must_use]
    pub fn key(symbol: &str) -> String {
        format!("StockSnapshot:{symbol}")
    }

    /// Pull full snapshots for `symbols` and replace each cached record.
    ///
    /// Returns the number of records written.
    ///
    /// # Errors
    ///
    /// Returns crawler or cache errors. Records written before a cache
    /// failure stay written.
    pub async fn refresh_all(&self, symbols: &[String]) -> Result<usize, SnapshotError> {
        if symbols.is_empty() {
            return Ok(0);
        }

        let snapshots = self.crawler.fetch_snapshot(symbols).await?;
        for snapshot in &snapshots {
            self.put(snapshot).await?;
        }
        metrics::record_snapshot_writes(SnapshotWriteKind::Full, snapshots.len());

        tracing::debug!(
            requested = symbols.len(),
            written = snapshots.len(),
            "Snapshots refreshed"
        );
        Ok(snapshots.len())
    }

    /// Merge a partial update into the cached record.
    ///
    /// A missing record starts zero-valued. Fields absent from `update` keep
    /// their cached values.
    ///
    /// # Errors
    ///
    /// Returns cache errors.
    pub async fn apply_partial(&self, update: &SnapshotUpdate) -> Result<StockSnapshot, SnapshotError> {
        let mut snapshot = self
            .get(&update.symbol)
            .await?
            .unwrap_or_else(|| StockSnapshot::empty(update.symbol.clone()));
        update.apply_to(&mut snapshot);
        self.put(&snapshot).await?;
        metrics::record_snapshot_writes(SnapshotWriteKind::Partial, 1);
        Ok(snapshot)
    }

    /// Read a cached record.
    ///
    /// # Errors
    ///
    /// Returns cache errors, including undecodable records.
    pub async fn get(&self, symbol: &str) -> Result<Option<StockSnapshot>, SnapshotError> {
        Ok(get_json(self.cache.as_ref(), &Self::key(symbol)).await?)
    }

    async fn put(&self, snapshot: &StockSnapshot) -> Result<(), SnapshotError> {
        set_json(
            self.cache.as_ref(),
            &Self::key(&snapshot.symbol),
            snapshot,
            None,
        )
        .await?;
        Ok(())
    }
}
