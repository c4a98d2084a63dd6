//! Drivers
//!
//! The long-running loops the binary spawns. Every loop logs failures and
//! retries on its next tick; only the shutdown token stops it.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::application::services::{SnapshotCache, SyncOrchestrator, TickerService};
use crate::domain::Resolution;

// =============================================================================
// Driver Selection
// =============================================================================

/// Error parsing a driver name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown driver: {0}")]
pub struct UnknownDriver(pub String);

/// A long-running ingestion loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Driver {
    /// Daily-resolution sync loop.
    Daily,
    /// Hourly-resolution sync loop.
    Hourly,
    /// One-shot minute sync with daily roll-up.
    Minute,
    /// Snapshot refresh loop.
    Snapshot,
    /// Live stream.
    Stream,
    /// Symbol discovery loop.
    Discovery,
}

impl Driver {
    /// Every driver.
    pub const ALL: [Self; 6] = [
        Self::Daily,
        Self::Hourly,
        Self::Minute,
        Self::Snapshot,
        Self::Stream,
        Self::Discovery,
    ];

    /// Config name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Hourly => "hourly",
            Self::Minute => "minute",
            Self::Snapshot => "snapshot",
            Self::Stream => "stream",
            Self::Discovery => "discovery",
        }
    }
}

impl FromStr for Driver {
    type Err = UnknownDriver;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == name)
            .ok_or_else(|| UnknownDriver(s.trim().to_string()))
    }
}

// =============================================================================
// Status
// =============================================================================

/// Completion times reported by the drivers, read by the health endpoint.
#[derive(Debug, Default)]
pub struct IngestStatus {
    last_sync: RwLock<BTreeMap<Resolution, DateTime<Utc>>>,
    last_snapshot_refresh: RwLock<Option<DateTime<Utc>>>,
    last_discovery: RwLock<Option<DateTime<Utc>>>,
}

impl IngestStatus {
    /// Create empty status.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed sync run.
    pub fn record_sync(&self, resolution: Resolution) {
        self.last_sync.write().insert(resolution, Utc::now());
    }

    /// Last completed sync run per resolution.
    #[must_use]
    pub fn last_syncs(&self) -> BTreeMap<Resolution, DateTime<Utc>> {
        self.last_sync.read().clone()
    }

    /// Record a completed snapshot refresh.
    pub fn record_snapshot_refresh(&self) {
        *self.last_snapshot_refresh.write() = Some(Utc::now());
    }

    /// Last completed snapshot refresh.
    #[must_use]
    pub fn last_snapshot_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_snapshot_refresh.read()
    }

    /// Record a completed discovery pass.
    pub fn record_discovery(&self) {
        *self.last_discovery.write() = Some(Utc::now());
    }

    /// Last completed discovery pass.
    #[must_use]
    pub fn last_discovery(&self) -> Option<DateTime<Utc>> {
        *self.last_discovery.read()
    }
}

// =============================================================================
// Loops
// =============================================================================

/// Sync loop settings.
#[derive(Debug, Clone, Copy)]
pub struct SyncLoopConfig {
    /// Resolution synced each tick.
    pub resolution: Resolution,
    /// Pause between runs.
    pub interval: Duration,
    /// Download workers.
    pub download_concurrency: usize,
    /// Write workers.
    pub write_concurrency: usize,
}

/// Run `sync_all` for one resolution until cancelled.
pub async fn run_sync_loop(
    orchestrator: Arc<SyncOrchestrator>,
    config: SyncLoopConfig,
    status: Arc<IngestStatus>,
    cancel: CancellationToken,
) {
    tracing::info!(
        resolution = %config.resolution,
        interval_secs = config.interval.as_secs(),
        "Sync loop started"
    );

    loop {
        let run = orchestrator.sync_all(
            config.resolution,
            config.download_concurrency,
            config.write_concurrency,
        );
        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = run => result,
        };

        match result {
            Ok(report) => {
                status.record_sync(config.resolution);
                if let Some(error) = report.first_error() {
                    tracing::warn!(
                        run_id = %report.run_id,
                        resolution = %config.resolution,
                        failed = report.failed.len(),
                        first_error = %error,
                        "Sync run finished with failures"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(resolution = %config.resolution, error = %e, "Sync run failed");
            }
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(config.interval) => {}
        }
    }

    tracing::info!(resolution = %config.resolution, "Sync loop stopped");
}

/// Sync one-minute bars with daily roll-up for every active symbol, once.
///
/// Returns the number of symbols that synced.
pub async fn run_minute_once(
    orchestrator: Arc<SyncOrchestrator>,
    tickers: TickerService,
    concurrency: usize,
    status: Arc<IngestStatus>,
) -> usize {
    let active = match tickers.active_tickers(true).await {
        Ok(active) => active,
        Err(e) => {
            tracing::warn!(error = %e, "Minute sync could not load active symbols");
            return 0;
        }
    };

    let synced = futures::stream::iter(active)
        .map(|ticker| {
            let orchestrator = Arc::clone(&orchestrator);
            async move {
                match orchestrator.sync_intraday_with_rollup(&ticker).await {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!(symbol = %ticker.symbol, error = %e, "Minute sync failed");
                        false
                    }
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .filter(|ok| futures::future::ready(*ok))
        .count()
        .await;

    status.record_sync(Resolution::Minute1);
    tracing::info!(synced, "Minute sync complete");
    synced
}

/// Refresh snapshots for all active symbols until cancelled.
pub async fn run_snapshot_loop(
    snapshots: SnapshotCache,
    tickers: TickerService,
    batch_size: usize,
    interval: Duration,
    status: Arc<IngestStatus>,
    cancel: CancellationToken,
) {
    tracing::info!(interval_secs = interval.as_secs(), "Snapshot loop started");

    loop {
        let refresh = refresh_snapshots(&snapshots, &tickers, batch_size);
        let refreshed = tokio::select! {
            () = cancel.cancelled() => break,
            refreshed = refresh => refreshed,
        };
        if let Some(count) = refreshed {
            status.record_snapshot_refresh();
            tracing::debug!(count, "Snapshot refresh complete");
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!("Snapshot loop stopped");
}

/// Refresh in batches. Returns `None` if any batch failed.
async fn refresh_snapshots(
    snapshots: &SnapshotCache,
    tickers: &TickerService,
    batch_size: usize,
) -> Option<usize> {
    let symbols = match tickers.active_symbols(true).await {
        Ok(symbols) => symbols,
        Err(e) => {
            tracing::warn!(error = %e, "Snapshot refresh could not load active symbols");
            return None;
        }
    };

    let mut total = 0;
    let mut failed = false;
    for chunk in symbols.chunks(batch_size.max(1)) {
        match snapshots.refresh_all(chunk).await {
            Ok(count) => total += count,
            Err(e) => {
                failed = true;
                tracing::warn!(symbols = chunk.len(), error = %e, "Snapshot batch failed");
            }
        }
    }
    (!failed).then_some(total)
}

/// Discover new symbols until cancelled.
pub async fn run_discovery_loop(
    tickers: TickerService,
    interval: Duration,
    status: Arc<IngestStatus>,
    cancel: CancellationToken,
) {
    tracing::info!(interval_secs = interval.as_secs(), "Discovery loop started");

    loop {
        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = tickers.discover() => result,
        };
        match result {
            Ok(_) => status.record_discovery(),
            Err(e) => tracing::warn!(error = %e, "Symbol discovery failed"),
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!("Discovery loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{
        InMemoryCache, InMemoryCrawler, InMemoryTickerRepository, KeyValueCache, TickerRepository,
    };
    use crate::domain::{StockSnapshot, Ticker};

    #[test]
    fn driver_names_round_trip() {
        for driver in Driver::ALL {
            assert_eq!(driver.as_str().parse::<Driver>().unwrap(), driver);
        }
        assert_eq!(" Stream ".parse::<Driver>().unwrap(), Driver::Stream);
        assert_eq!(
            "weekly".parse::<Driver>(),
            Err(UnknownDriver("weekly".to_string()))
        );
    }

    #[test]
    fn status_records() {
        let status = IngestStatus::new();
        assert!(status.last_syncs().is_empty());
        status.record_sync(Resolution::Daily);
        status.record_snapshot_refresh();
        assert!(status.last_syncs().contains_key(&Resolution::Daily));
        assert!(status.last_snapshot_refresh().is_some());
        assert!(status.last_discovery().is_none());
    }

    #[tokio::test]
    async fn snapshot_refresh_batches_all_active_symbols() {
        let cache: Arc<dyn KeyValueCache> = Arc::new(InMemoryCache::new());
        let crawler = Arc::new(InMemoryCrawler::new());
        for symbol in ["AAA", "BBB", "CCC"] {
            crawler.set_snapshot(StockSnapshot::empty(symbol));
        }
        let tickers = TickerService::new(
            Arc::new(InMemoryTickerRepository::with_tickers([
                Ticker::new("AAA", "HOSE").with_active(true),
                Ticker::new("BBB", "HOSE").with_active(true),
                Ticker::new("CCC", "HOSE").with_active(true),
            ])),
            Arc::clone(&cache),
            crawler.clone(),
            Vec::new(),
        );
        let snapshots = SnapshotCache::new(Arc::clone(&cache), crawler);

        assert_eq!(refresh_snapshots(&snapshots, &tickers, 2).await, Some(3));
        assert!(snapshots.get("CCC").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn discovery_loop_stops_on_cancel() {
        let cache: Arc<dyn KeyValueCache> = Arc::new(InMemoryCache::new());
        let crawler = Arc::new(InMemoryCrawler::new());
        crawler.set_symbols(vec![Ticker::new("AAA", "HOSE")]);
        let repository = Arc::new(InMemoryTickerRepository::new());
        let tickers = TickerService::new(repository.clone(), cache, crawler, Vec::new());
        let status = Arc::new(IngestStatus::new());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_discovery_loop(
            tickers,
            Duration::from_secs(3600),
            Arc::clone(&status),
            cancel.clone(),
        ));
        for _ in 0..200 {
            if status.last_discovery().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        handle.await.unwrap();

        assert!(status.last_discovery().is_some());
        assert!(repository.get("AAA").await.unwrap().is_some());
    }
}
