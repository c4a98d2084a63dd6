//! Historical Sync Orchestrator
//!
//! Incremental per-symbol sync of historical bars, plus the all-symbols
//! download/write pipeline.
//!
//! # Per-symbol flow
//!
//! ```text
//! Idle -> Fetching -> Validating -> Writing -> Idle
//! ```
//!
//! 1. Read the watermark. The fetch window starts there (or at the initial
//!    window start when none exists) and ends now.
//! 2. Fetch bars from the crawler.
//! 3. Under `OverwritePolicy::Prevent`, reject the batch if any bar is older
//!    than the watermark.
//! 4. Advance the watermark to the newest bar.
//! 5. Batch-write the bars. A failed write restores the previous watermark.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::application::ports::{CacheError, CrawledBar, Crawler, CrawlerError};
use crate::application::services::{
    BarStore, BarStoreError, TickerService, TickerServiceError, WatermarkStore,
};
use crate::domain::{Bar, Resolution, ResolutionError, Ticker, max_timestamp};
use crate::infrastructure::metrics::{self, SyncOutcomeLabel};

/// Earliest bar time ever requested: 1990-12-31T00:00:00Z.
pub const EPOCH_FLOOR: i64 = 662_601_600;

/// Outcome buffer for `sync_all` workers.
const OUTCOME_BUFFER: usize = 64;

// =============================================================================
// Errors and Results
// =============================================================================

/// Sync error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    /// The symbol is not in the ticker registry.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// A bar is older than the watermark under the prevent-overwrite policy.
    #[error("stale data for {symbol}: bar {bar_timestamp} is older than watermark {watermark}")]
    StaleData {
        /// Symbol.
        symbol: String,
        /// Offending bar time (unix seconds).
        bar_timestamp: i64,
        /// Watermark at call time (unix seconds).
        watermark: i64,
    },

    /// Unsupported resolution.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Upstream fetch failed.
    #[error(transparent)]
    Crawler(#[from] CrawlerError),

    /// Watermark store failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Bar store failed.
    #[error(transparent)]
    BarStore(#[from] BarStoreError),

    /// Ticker lookup failed.
    #[error(transparent)]
    Tickers(#[from] TickerServiceError),
}

/// Whether a sync may accept bars older than the watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Accept any returned bar; upserts absorb overlaps.
    #[default]
    Allow,
    /// Reject the whole batch if any bar predates the watermark.
    Prevent,
}

/// Result of one successful per-symbol sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Symbol.
    pub symbol: String,
    /// Resolution.
    pub resolution: Resolution,
    /// Bars fetched and written.
    pub bars: usize,
    /// Watermark after the sync.
    pub watermark: Option<i64>,
}

/// A symbol that failed during `sync_all`.
#[derive(Debug, Clone)]
pub struct SymbolFailure {
    /// Symbol.
    pub symbol: String,
    /// Failure cause.
    pub error: SyncError,
}

/// Result of a `sync_all` run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Run identifier, attached to the run's log events.
    pub run_id: Uuid,
    /// Resolution synced.
    pub resolution: Resolution,
    /// Symbols that synced.
    pub succeeded: Vec<SyncOutcome>,
    /// Symbols that failed, in the order failures were observed.
    pub failed: Vec<SymbolFailure>,
}

impl SyncReport {
    fn new(run_id: Uuid, resolution: Resolution) -> Self {
        Self {
            run_id,
            resolution,
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// First failure observed in the run.
    #[must_use]
    pub fn first_error(&self) -> Option<&SyncError> {
        self.failed.first().map(|f| &f.error)
    }

    /// Whether every symbol synced.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// What the minute-to-daily roll-up did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollupAction {
    /// No previous minute watermark, no new bars, or a day boundary was
    /// crossed since the last minute sync.
    Skipped,
    /// The latest daily bar was extended with the new minute bars.
    Extended,
    /// The latest daily bar is from another day; a daily sync was run.
    Resynced,
}

/// Result of `sync_intraday_with_rollup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupOutcome {
    /// The minute sync.
    pub minute: SyncOutcome,
    /// What happened to the daily bar.
    pub action: RollupAction,
}

/// Bars fetched for one symbol, waiting to be committed.
#[derive(Debug)]
struct FetchedBatch {
    ticker: Ticker,
    resolution: Resolution,
    previous: Option<i64>,
    bars: Vec<Bar>,
}

enum PipelineOutcome {
    Synced(SyncOutcome),
    Failed(SymbolFailure),
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How far back an intraday sync with no watermark starts.
    pub intraday_lookback: TimeDelta,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            intraday_lookback: TimeDelta::days(30),
        }
    }
}

/// Incremental historical sync.
pub struct SyncOrchestrator {
    crawler: Arc<dyn Crawler>,
    watermarks: WatermarkStore,
    bars: BarStore,
    tickers: TickerService,
    config: SyncConfig,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    /// Create a new orchestrator.
    #[must_use]
    pub fn new(
        crawler: Arc<dyn Crawler>,
        watermarks: WatermarkStore,
        bars: BarStore,
        tickers: TickerService,
        config: SyncConfig,
    ) -> Self {
        Self {
            crawler,
            watermarks,
            bars,
            tickers,
            config,
        }
    }

    /// Sync one symbol.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::UnknownSymbol` for unregistered symbols,
    /// `SyncError::StaleData` when `policy` is `Prevent` and the batch
    /// regresses, or any collaborator error. Nothing is retried.
    pub async fn sync(
        &self,
        symbol: &str,
        resolution: Resolution,
        policy: OverwritePolicy,
    ) -> Result<SyncOutcome, SyncError> {
        let ticker = self.ticker(symbol).await?;
        self.sync_ticker(&ticker, resolution, policy).await
    }

    async fn sync_ticker(
        &self,
        ticker: &Ticker,
        resolution: Resolution,
        policy: OverwritePolicy,
    ) -> Result<SyncOutcome, SyncError> {
        let batch = self.fetch(ticker, resolution, policy).await?;
        self.commit(batch).await
    }

    /// Sync every active symbol through a download/write pipeline.
    ///
    /// A bounded ticker queue feeds `download_concurrency` download workers,
    /// whose batches feed `write_concurrency` write workers through a bounded
    /// queue. Every symbol's outcome lands in the report. Failed symbols keep
    /// their old watermark and are picked up by the next run.
    ///
    /// # Errors
    ///
    /// Returns an error only if the active ticker list cannot be loaded.
    /// Per-symbol failures are reported in `SyncReport::failed`.
    pub async fn sync_all(
        self: &Arc<Self>,
        resolution: Resolution,
        download_concurrency: usize,
        write_concurrency: usize,
    ) -> Result<SyncReport, SyncError> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let tickers = self.tickers.active_tickers(true).await?;
        let symbols = tickers.len();

        tracing::info!(
            %run_id,
            resolution = %resolution,
            symbols,
            download_concurrency,
            write_concurrency,
            "Sync run starting"
        );

        let download_concurrency = download_concurrency.max(1);
        let write_concurrency = write_concurrency.max(1);
        let (ticker_tx, ticker_rx) = mpsc::channel::<Ticker>(download_concurrency);
        let (batch_tx, batch_rx) = mpsc::channel::<FetchedBatch>(write_concurrency);
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<PipelineOutcome>(OUTCOME_BUFFER);
        let ticker_rx = Arc::new(Mutex::new(ticker_rx));
        let batch_rx = Arc::new(Mutex::new(batch_rx));

        let mut workers = JoinSet::new();

        workers.spawn(async move {
            for ticker in tickers {
                if ticker_tx.send(ticker).await.is_err() {
                    break;
                }
            }
        });

        for _ in 0..download_concurrency {
            let this = Arc::clone(self);
            let ticker_rx = Arc::clone(&ticker_rx);
            let batch_tx = batch_tx.clone();
            let outcome_tx = outcome_tx.clone();
            workers.spawn(async move {
                loop {
                    let next = ticker_rx.lock().await.recv().await;
                    let Some(ticker) = next else { break };
                    match this.fetch(&ticker, resolution, OverwritePolicy::Allow).await {
                        Ok(batch) => {
                            if batch_tx.send(batch).await.is_err() {
                                break;
                            }
                        }
                        Err(error) => {
                            let failure = SymbolFailure {
                                symbol: ticker.symbol,
                                error,
                            };
                            let _ = outcome_tx.send(PipelineOutcome::Failed(failure)).await;
                        }
                    }
                }
            });
        }
        drop(batch_tx);

        for _ in 0..write_concurrency {
            let this = Arc::clone(self);
            let batch_rx = Arc::clone(&batch_rx);
            let outcome_tx = outcome_tx.clone();
            workers.spawn(async move {
                loop {
                    let next = batch_rx.lock().await.recv().await;
                    let Some(batch) = next else { break };
                    let symbol = batch.ticker.symbol.clone();
                    let outcome = match this.commit(batch).await {
                        Ok(outcome) => PipelineOutcome::Synced(outcome),
                        Err(error) => PipelineOutcome::Failed(SymbolFailure { symbol, error }),
                    };
                    let _ = outcome_tx.send(outcome).await;
                }
            });
        }
        drop(outcome_tx);

        let mut report = SyncReport::new(run_id, resolution);
        while let Some(outcome) = outcome_rx.recv().await {
            match outcome {
                PipelineOutcome::Synced(outcome) => {
                    metrics::record_symbol_synced(resolution, SyncOutcomeLabel::Success);
                    report.succeeded.push(outcome);
                }
                PipelineOutcome::Failed(failure) => {
                    metrics::record_symbol_synced(resolution, SyncOutcomeLabel::Failure);
                    tracing::warn!(
                        %run_id,
                        symbol = %failure.symbol,
                        error = %failure.error,
                        "Symbol sync failed"
                    );
                    report.failed.push(failure);
                }
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(%run_id, error = %e, "Sync worker panicked");
            }
        }

        let elapsed = started.elapsed();
        metrics::record_sync_duration(resolution, elapsed);
        tracing::info!(
            %run_id,
            resolution = %resolution,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            elapsed_ms = elapsed.as_millis(),
            "Sync run complete"
        );
        Ok(report)
    }

    /// Sync one-minute bars for a ticker, then fold them into the daily bar.
    ///
    /// Takes the registry record so callers iterating the active list avoid
    /// one registry read per symbol.
    ///
    /// When the newest minute bar is on the same UTC day as the previous
    /// minute watermark, the latest daily bar for that day is extended (high,
    /// low, close and volume). If the latest daily bar is from another day, a
    /// daily sync runs instead.
    ///
    /// # Errors
    ///
    /// Returns any error from the minute sync, the daily lookup or the daily
    /// write.
    pub async fn sync_intraday_with_rollup(
        &self,
        ticker: &Ticker,
    ) -> Result<RollupOutcome, SyncError> {
        let batch = self
            .fetch(ticker, Resolution::Minute1, OverwritePolicy::Allow)
            .await?;
        let previous = batch.previous;
        let minute_bars = batch.bars.clone();
        let minute = self.commit(batch).await?;

        let action = match (previous, minute_bars.last()) {
            (Some(previous), Some(newest)) if same_day(previous, newest) => {
                self.roll_up(ticker, previous, newest, &minute_bars)
                    .await?
            }
            _ => RollupAction::Skipped,
        };

        tracing::debug!(
            symbol = %ticker.symbol,
            action = ?action,
            bars = minute.bars,
            "Minute sync rolled up"
        );
        Ok(RollupOutcome { minute, action })
    }

    async fn roll_up(
        &self,
        ticker: &Ticker,
        previous: i64,
        newest: &Bar,
        minute_bars: &[Bar],
    ) -> Result<RollupAction, SyncError> {
        let daily_mark = self.watermarks.get(&ticker.symbol, Resolution::Daily).await?;
        let latest_daily = self
            .bars
            .last_bars(Resolution::Daily, ticker, Utc::now(), 1, daily_mark)
            .await?
            .pop();

        let Some(mut daily) = latest_daily.filter(|d| d.day() == newest.day()) else {
            self.sync_ticker(ticker, Resolution::Daily, OverwritePolicy::Allow)
                .await?;
            return Ok(RollupAction::Resynced);
        };

        for bar in minute_bars.iter().filter(|b| b.timestamp() > previous) {
            daily.high = daily.high.max(bar.high);
            daily.low = daily.low.min(bar.low);
            daily.volume += bar.volume;
        }
        daily.close = newest.close;

        self.bars.write(Resolution::Daily.partition(), &daily).await?;
        if daily_mark.is_none_or(|mark| daily.timestamp() > mark) {
            self.watermarks
                .set(&ticker.symbol, Resolution::Daily, daily.timestamp())
                .await?;
        }
        Ok(RollupAction::Extended)
    }

    // -------------------------------------------------------------------------
    // Steps
    // -------------------------------------------------------------------------

    async fn ticker(&self, symbol: &str) -> Result<Ticker, SyncError> {
        self.tickers
            .get(symbol)
            .await?
            .ok_or_else(|| SyncError::UnknownSymbol(symbol.to_string()))
    }

    /// Steps 1-3.
    async fn fetch(
        &self,
        ticker: &Ticker,
        resolution: Resolution,
        policy: OverwritePolicy,
    ) -> Result<FetchedBatch, SyncError> {
        let previous = self.watermarks.get(&ticker.symbol, resolution).await?;
        let now = Utc::now();
        let from = previous.unwrap_or_else(|| self.initial_from(resolution, now));
        let to = now.timestamp();

        let crawled = self
            .crawler
            .fetch_history(&ticker.symbol, resolution, from, to)
            .await?;
        let bars = normalize(ticker, crawled);

        if policy == OverwritePolicy::Prevent
            && let Some(watermark) = previous
            && let Some(stale) = bars.iter().find(|b| b.timestamp() < watermark)
        {
            return Err(SyncError::StaleData {
                symbol: ticker.symbol.clone(),
                bar_timestamp: stale.timestamp(),
                watermark,
            });
        }

        Ok(FetchedBatch {
            ticker: ticker.clone(),
            resolution,
            previous,
            bars,
        })
    }

    /// Steps 4-5.
    async fn commit(&self, batch: FetchedBatch) -> Result<SyncOutcome, SyncError> {
        let FetchedBatch {
            ticker,
            resolution,
            previous,
            bars,
        } = batch;
        let symbol = ticker.symbol;

        let newest = max_timestamp(&bars);
        let advanced = match (newest, previous) {
            (Some(newest), Some(previous)) => newest > previous,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if advanced && let Some(newest) = newest {
            self.watermarks.set(&symbol, resolution, newest).await?;
        }

        if let Err(e) = self.bars.write_batch(resolution.partition(), &bars).await {
            if advanced {
                self.restore_watermark(&symbol, resolution, previous).await;
            }
            return Err(e.into());
        }

        let watermark = if advanced { newest } else { previous };
        tracing::debug!(
            symbol = %symbol,
            resolution = %resolution,
            bars = bars.len(),
            watermark,
            "Symbol synced"
        );
        Ok(SyncOutcome {
            symbol,
            resolution,
            bars: bars.len(),
            watermark,
        })
    }

    async fn restore_watermark(&self, symbol: &str, resolution: Resolution, previous: Option<i64>) {
        let restored = match previous {
            Some(previous) => self.watermarks.set(symbol, resolution, previous).await,
            None => self.watermarks.clear(symbol, resolution).await,
        };
        if let Err(e) = restored {
            tracing::error!(
                symbol,
                resolution = %resolution,
                error = %e,
                "Failed to restore watermark after write failure"
            );
        }
    }

    fn initial_from(&self, resolution: Resolution, now: DateTime<Utc>) -> i64 {
        if resolution.is_intraday() {
            now.checked_sub_signed(self.config.intraday_lookback)
                .map_or(EPOCH_FLOOR, |start| start.timestamp().max(EPOCH_FLOOR))
        } else {
            EPOCH_FLOOR
        }
    }
}

/// Tie crawled bars to a ticker, ascending with one bar per timestamp.
fn normalize(ticker: &Ticker, crawled: Vec<CrawledBar>) -> Vec<Bar> {
    let mut bars: Vec<Bar> = crawled
        .into_iter()
        .map(|c| Bar {
            symbol: ticker.symbol.clone(),
            exchange: ticker.exchange.clone(),
            time: c.time,
            open: c.open,
            high: c.high,
            low: c.low,
            close: c.close,
            volume: c.volume,
        })
        .collect();
    bars.sort_by_key(|b| b.time);
    // Keep the last of any duplicate timestamps, matching upsert semantics.
    bars.reverse();
    bars.dedup_by_key(|b| b.time);
    bars.reverse();
    bars
}

fn same_day(timestamp: i64, bar: &Bar) -> bool {
    DateTime::<Utc>::from_timestamp(timestamp, 0).is_some_and(|t| t.date_naive() == bar.day())
}
