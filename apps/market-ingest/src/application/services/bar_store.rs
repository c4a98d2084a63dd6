//! Bar Store
//!
//! Encodes bars as time-series points (measurement = exchange, tag = symbol,
//! fields = OHLCV) and provides batch writes, range queries and a bounded
//! "last N bars" query.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use futures::{StreamExt, TryStreamExt};

use crate::application::ports::{Point, PointQuery, PointValue, TimeSeriesBackend, TimeSeriesError};
use crate::domain::{Bar, Resolution, ResolutionError, Ticker};
use crate::infrastructure::metrics;

const SYMBOL_TAG: &str = "symbol";

/// Bar store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BarStoreError {
    /// The partition does not map to a supported resolution.
    #[error(transparent)]
    UnsupportedResolution(#[from] ResolutionError),

    /// No window estimator exists for this partition.
    #[error("last-N query not implemented for partition {0}")]
    NotImplemented(String),

    /// A stored point is missing bar fields.
    #[error("stored point is not a bar: {0}")]
    InvalidPoint(String),

    /// Backend failure.
    #[error(transparent)]
    Backend(#[from] TimeSeriesError),
}

/// Bar store tuning.
#[derive(Debug, Clone)]
pub struct BarStoreConfig {
    /// Points per backend write in a batch.
    pub batch_size: usize,
    /// Concurrent backend writes per batch.
    pub write_concurrency: usize,
    /// Trading minutes per session, used to size intraday last-N windows.
    /// `None` disables intraday last-N queries.
    pub session_minutes: Option<u32>,
}

impl Default for BarStoreConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            write_concurrency: 8,
            session_minutes: Some(270),
        }
    }
}

/// Bar persistence over a `TimeSeriesBackend`.
#[derive(Clone)]
pub struct BarStore {
    backend: Arc<dyn TimeSeriesBackend>,
    config: BarStoreConfig,
}

impl std::fmt::Debug for BarStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BarStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BarStore {
    /// Create a store over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn TimeSeriesBackend>, config: BarStoreConfig) -> Self {
        Self { backend, config }
    }

    /// Upsert one bar.
    ///
    /// # Errors
    ///
    /// Returns `BarStoreError::Backend` if the write fails.
    pub async fn write(&self, partition: &str, bar: &Bar) -> Result<(), BarStoreError> {
        self.backend
            .write_points(partition, &[encode_bar(bar)])
            .await?;
        metrics::record_bars_written(partition, 1);
        Ok(())
    }

    /// Upsert a batch of bars with concurrent chunked writes.
    ///
    /// Returns the first error to complete. Chunks that finished before (or
    /// alongside) the failure stay written.
    ///
    /// # Errors
    ///
    /// Returns `BarStoreError::Backend` if any chunk fails.
    pub async fn write_batch(&self, partition: &str, bars: &[Bar]) -> Result<(), BarStoreError> {
        if bars.is_empty() {
            return Ok(());
        }

        let chunk_size = self.config.batch_size.max(1);
        let backend = &self.backend;
        let writes: futures::future::BoxFuture<'_, Result<(), TimeSeriesError>> = Box::pin(
            futures::stream::iter(bars.chunks(chunk_size))
                .map(|chunk| async move {
                    let points: Vec<Point> = chunk.iter().map(encode_bar).collect();
                    backend.write_points(partition, &points).await?;
                    metrics::record_bars_written(partition, chunk.len());
                    Ok::<(), TimeSeriesError>(())
                })
                .buffer_unordered(self.config.write_concurrency.max(1))
                .try_for_each(|()| futures::future::ok(())),
        );
        writes.await?;

        tracing::debug!(partition, bars = bars.len(), "Bar batch written");
        Ok(())
    }

    /// Bars for one symbol within `[from, to]`, ascending by time.
    ///
    /// An inverted window (`from > to`) is empty.
    ///
    /// # Errors
    ///
    /// Returns backend or decoding errors.
    pub async fn query_range(
        &self,
        partition: &str,
        symbol: &str,
        exchange: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, BarStoreError> {
        self.query(partition, symbol, exchange, from, to, None).await
    }

    /// Up to `n` most recent bars ending at `to`, ascending by time.
    ///
    /// The query window is estimated from a trading calendar heuristic, so
    /// long holiday clusters can yield fewer than `n` bars.
    ///
    /// # Errors
    ///
    /// Returns `BarStoreError::UnsupportedResolution` for an unknown
    /// partition, `BarStoreError::NotImplemented` when intraday windows are
    /// disabled, or backend errors.
    pub async fn query_last_n(
        &self,
        partition: &str,
        symbol: &str,
        exchange: &str,
        to: DateTime<Utc>,
        n: usize,
    ) -> Result<Vec<Bar>, BarStoreError> {
        let resolution = Resolution::from_partition(partition)?;
        let from = estimate_from(resolution, to, n, self.config.session_minutes)?;
        if n == 0 {
            return Ok(Vec::new());
        }
        self.query(partition, symbol, exchange, from, to, Some(n))
            .await
    }

    /// Up to `n` most recent bars for a ticker, anchored at the watermark.
    ///
    /// The window ends at `min(to, watermark)` when a watermark exists, so a
    /// symbol that stopped trading still returns its last bars.
    ///
    /// # Errors
    ///
    /// Same as [`BarStore::query_last_n`].
    pub async fn last_bars(
        &self,
        resolution: Resolution,
        ticker: &Ticker,
        to: DateTime<Utc>,
        n: usize,
        watermark: Option<i64>,
    ) -> Result<Vec<Bar>, BarStoreError> {
        let anchor = watermark
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .map_or(to, |mark| mark.min(to));
        self.query_last_n(
            resolution.partition(),
            &ticker.symbol,
            &ticker.exchange,
            anchor,
            n,
        )
        .await
    }

    async fn query(
        &self,
        partition: &str,
        symbol: &str,
        exchange: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<Bar>, BarStoreError> {
        if from > to {
            return Ok(Vec::new());
        }
        let query = PointQuery {
            measurement: exchange.to_string(),
            tag_key: SYMBOL_TAG.to_string(),
            tag_value: symbol.to_string(),
            from,
            to,
            limit,
        };
        let points = self.backend.query(partition, &query).await?;
        let mut bars = points
            .iter()
            .map(decode_point)
            .collect::<Result<Vec<_>, _>>()?;
        bars.sort_by_key(|b| b.time);
        Ok(bars)
    }
}

// =============================================================================
// Window Estimation
// =============================================================================

/// Estimate the start of a window holding at least `n` bars ending at `to`.
///
/// Trading days are grossed up to calendar days by 7/4 (five trading days
/// per week, with slack for holidays). Daily windows span `ceil(n * 7/4)`
/// days. Intraday windows first convert `n` into trading days using
/// `session_minutes`, plus one day for a partial session at `to`.
///
/// # Errors
///
/// Returns `BarStoreError::NotImplemented` for intraday resolutions when
/// `session_minutes` is `None`.
pub fn estimate_from(
    resolution: Resolution,
    to: DateTime<Utc>,
    n: usize,
    session_minutes: Option<u32>,
) -> Result<DateTime<Utc>, BarStoreError> {
    let n = i64::try_from(n).unwrap_or(i64::MAX / 8);
    let trading_days = if resolution.is_intraday() {
        let session = session_minutes
            .filter(|m| *m > 0)
            .ok_or_else(|| BarStoreError::NotImplemented(resolution.partition().to_string()))?;
        let bars_per_day = (i64::from(session) / resolution.minutes()).max(1);
        (n + bars_per_day - 1) / bars_per_day + 1
    } else {
        n
    };
    let calendar_days = (trading_days * 7 + 3) / 4;
    Ok(TimeDelta::try_days(calendar_days)
        .and_then(|span| to.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC))
}

// =============================================================================
// Point Encoding
// =============================================================================

/// Encode a bar as a time-series point.
#[must_use]
pub fn encode_bar(bar: &Bar) -> Point {
    Point {
        measurement: bar.exchange.clone(),
        tags: BTreeMap::from([(SYMBOL_TAG.to_string(), bar.symbol.clone())]),
        fields: BTreeMap::from([
            ("open".to_string(), PointValue::Float(bar.open)),
            ("high".to_string(), PointValue::Float(bar.high)),
            ("low".to_string(), PointValue::Float(bar.low)),
            ("close".to_string(), PointValue::Float(bar.close)),
            ("volume".to_string(), PointValue::Integer(bar.volume)),
        ]),
        time: bar.time,
    }
}

/// Decode a stored point into a bar.
///
/// # Errors
///
/// Returns `BarStoreError::InvalidPoint` if the symbol tag or any OHLCV
/// field is missing.
pub fn decode_point(point: &Point) -> Result<Bar, BarStoreError> {
    let field = |name: &str| {
        point
            .fields
            .get(name)
            .copied()
            .ok_or_else(|| BarStoreError::InvalidPoint(format!("missing field {name}")))
    };
    let symbol = point
        .tags
        .get(SYMBOL_TAG)
        .cloned()
        .ok_or_else(|| BarStoreError::InvalidPoint("missing symbol tag".to_string()))?;

    Ok(Bar {
        symbol,
        exchange: point.measurement.clone(),
        time: point.time,
        open: field("open")?.as_f64(),
        high: field("high")?.as_f64(),
        low: field("low")?.as_f64(),
        close: field("close")?.as_f64(),
        volume: field("volume")?.as_i64(),
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::TimeZone;

    use super::*;
    use crate::application::ports::InMemoryTimeSeries;

    fn bar(day: u32, close: f64) -> Bar {
        Bar {
            symbol: "ABC".to_string(),
            exchange: "HOSE".to_string(),
            time: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: i64::from(day) * 100,
        }
    }

    fn store(config: BarStoreConfig) -> (BarStore, Arc<InMemoryTimeSeries>) {
        let backend = Arc::new(InMemoryTimeSeries::new());
        (BarStore::new(backend.clone(), config), backend)
    }

    #[test]
    fn encode_decode_point() {
        let original = bar(3, 10.5);
        let point = encode_bar(&original);
        assert_eq!(point.measurement, "HOSE");
        assert_eq!(point.tags["symbol"], "ABC");
        assert_eq!(point.fields["volume"], PointValue::Integer(300));
        assert_eq!(decode_point(&point).unwrap(), original);
    }

    #[test]
    fn decode_rejects_incomplete_point() {
        let mut point = encode_bar(&bar(1, 1.0));
        point.fields.remove("close");
        assert!(matches!(
            decode_point(&point),
            Err(BarStoreError::InvalidPoint(_))
        ));
    }

    #[test]
    fn daily_estimate_matches_calendar_grossing() {
        let to = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let from = estimate_from(Resolution::Daily, to, 10, Some(270)).unwrap();
        assert_eq!(to - from, TimeDelta::days(18));

        let from = estimate_from(Resolution::Daily, to, 4, None).unwrap();
        assert_eq!(to - from, TimeDelta::days(7));
    }

    #[test]
    fn intraday_estimate_uses_session_length() {
        let to = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        // 270 one-minute bars per session: 300 bars -> 2 sessions + 1 partial = 3 trading days.
        let from = estimate_from(Resolution::Minute1, to, 300, Some(270)).unwrap();
        assert_eq!(to - from, TimeDelta::days(6));

        // Hourly: 4 bars per session, 10 bars -> 3 + 1 = 4 trading days -> 7 calendar days.
        let from = estimate_from(Resolution::Minute60, to, 10, Some(270)).unwrap();
        assert_eq!(to - from, TimeDelta::days(7));
    }

    #[test]
    fn intraday_estimate_disabled() {
        let to = Utc::now();
        assert!(matches!(
            estimate_from(Resolution::Minute5, to, 10, None),
            Err(BarStoreError::NotImplemented(_))
        ));
    }

    #[tokio::test]
    async fn batch_write_is_idempotent() {
        let (store, backend) = store(BarStoreConfig {
            batch_size: 2,
            ..BarStoreConfig::default()
        });
        let bars: Vec<Bar> = (1..=5).map(|d| bar(d, f64::from(d))).collect();

        store.write_batch("ResolutionD", &bars).await.unwrap();
        let once = store
            .query_range("ResolutionD", "ABC", "HOSE", bars[0].time, bars[4].time)
            .await
            .unwrap();

        store.write_batch("ResolutionD", &bars).await.unwrap();
        let twice = store
            .query_range("ResolutionD", "ABC", "HOSE", bars[0].time, bars[4].time)
            .await
            .unwrap();

        assert_eq!(once, bars);
        assert_eq!(twice, once);
        assert_eq!(backend.point_count("ResolutionD"), 5);
    }

    #[tokio::test]
    async fn single_write_upserts() {
        let (store, _) = store(BarStoreConfig::default());
        store.write("ResolutionD", &bar(2, 1.0)).await.unwrap();
        store.write("ResolutionD", &bar(2, 2.0)).await.unwrap();

        let bars = store
            .query_range(
                "ResolutionD",
                "ABC",
                "HOSE",
                bar(1, 0.0).time,
                bar(3, 0.0).time,
            )
            .await
            .unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 2.0);
    }

    #[tokio::test]
    async fn last_n_returns_newest_ascending() {
        let (store, _) = store(BarStoreConfig::default());
        let bars: Vec<Bar> = (1..=20).map(|d| bar(d, f64::from(d))).collect();
        store.write_batch("ResolutionD", &bars).await.unwrap();

        let to = bar(20, 0.0).time;
        let last = store
            .query_last_n("ResolutionD", "ABC", "HOSE", to, 3)
            .await
            .unwrap();
        let days: Vec<u32> = last.iter().map(|b| b.volume as u32 / 100).collect();
        assert_eq!(days, vec![18, 19, 20]);
    }

    #[tokio::test]
    async fn last_n_window_can_underfetch() {
        let (store, _) = store(BarStoreConfig::default());
        // Only two bars exist within the 18-day window ending Jan 30.
        store
            .write_batch("ResolutionD", &[bar(1, 1.0), bar(20, 2.0), bar(30, 3.0)])
            .await
            .unwrap();

        let to = bar(30, 0.0).time;
        let last = store
            .query_last_n("ResolutionD", "ABC", "HOSE", to, 10)
            .await
            .unwrap();
        assert_eq!(last.len(), 2);
        assert!(last[0].time < last[1].time);
    }

    #[tokio::test]
    async fn last_n_unknown_partition() {
        let (store, _) = store(BarStoreConfig::default());
        let result = store
            .query_last_n("ResolutionW", "ABC", "HOSE", Utc::now(), 5)
            .await;
        assert!(matches!(
            result,
            Err(BarStoreError::UnsupportedResolution(_))
        ));
    }

    #[tokio::test]
    async fn last_bars_anchor_at_watermark() {
        let (store, _) = store(BarStoreConfig::default());
        let bars: Vec<Bar> = (1..=10).map(|d| bar(d, f64::from(d))).collect();
        store.write_batch("ResolutionD", &bars).await.unwrap();

        let ticker = Ticker::new("ABC", "HOSE");
        let to = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        // Without a watermark the window ending in June holds nothing.
        let idle = store
            .last_bars(Resolution::Daily, &ticker, to, 2, None)
            .await
            .unwrap();
        assert!(idle.is_empty());

        let mark = bar(10, 0.0).timestamp();
        let anchored = store
            .last_bars(Resolution::Daily, &ticker, to, 2, Some(mark))
            .await
            .unwrap();
        assert_eq!(anchored, bars[8..].to_vec());
    }

    struct FailingBackend;

    #[async_trait]
    impl TimeSeriesBackend for FailingBackend {
        async fn write_points(&self, _: &str, _: &[Point]) -> Result<(), TimeSeriesError> {
            Err(TimeSeriesError::Backend {
                message: "down".to_string(),
            })
        }

        async fn query(&self, _: &str, _: &PointQuery) -> Result<Vec<Point>, TimeSeriesError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn inverted_window_is_empty() {
        let (store, _) = store(BarStoreConfig::default());
        store.write("ResolutionD", &bar(5, 1.0)).await.unwrap();

        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        assert_eq!(
            store
                .query_range("ResolutionD", "ABC", "HOSE", from, to)
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(
            store
                .query_range("ResolutionD", "ABC", "HOSE", to, from)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn batch_write_surfaces_backend_error() {
        let store = BarStore::new(Arc::new(FailingBackend), BarStoreConfig::default());
        let result = store.write_batch("ResolutionD", &[bar(1, 1.0)]).await;
        assert!(matches!(result, Err(BarStoreError::Backend(_))));
        assert!(store.write_batch("ResolutionD", &[]).await.is_ok());
    }
}
