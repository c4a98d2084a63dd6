//! Crawler Port (Driven Port)
//!
//! Upstream market data source: symbol lists, historical bars and full
//! quote snapshots.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::{DecodeError, Resolution, StockSnapshot, Ticker};

/// Crawler error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CrawlerError {
    /// Transport failure.
    #[error("crawler request failed: {message}")]
    Http {
        /// Error details.
        message: String,
    },

    /// Upstream answered with a non-success status.
    #[error("crawler returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Upstream payload could not be parsed.
    #[error("invalid crawler response: {message}")]
    InvalidResponse {
        /// Error details.
        message: String,
    },

    /// Upstream listed an exchange we do not map.
    #[error("unsupported exchange: {0}")]
    UnsupportedExchange(String),

    /// The source serves no bars at this resolution.
    #[error("resolution {0} is not served by this source")]
    UnsupportedResolution(Resolution),

    /// The source does not serve this kind of data.
    #[error("{0} is not served by this source")]
    Unsupported(&'static str),

    /// An encoded snapshot could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// One historical bar as returned upstream, before it is tied to a ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawledBar {
    /// Bar open time.
    pub time: DateTime<Utc>,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Volume.
    pub volume: i64,
}

/// Port for the upstream market data crawler.
#[async_trait]
pub trait Crawler: Send + Sync {
    /// List all tradable symbols. Returned tickers are inactive.
    async fn fetch_symbols(&self) -> Result<Vec<Ticker>, CrawlerError>;

    /// Fetch bars for `symbol` within `[from, to]` (unix seconds).
    async fn fetch_history(
        &self,
        symbol: &str,
        resolution: Resolution,
        from: i64,
        to: i64,
    ) -> Result<Vec<CrawledBar>, CrawlerError>;

    /// Fetch full snapshots for a set of symbols.
    async fn fetch_snapshot(&self, symbols: &[String]) -> Result<Vec<StockSnapshot>, CrawlerError>;
}

// =============================================================================
// In-Memory Implementation
// =============================================================================

/// A recorded `fetch_history` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryCall {
    /// Requested symbol.
    pub symbol: String,
    /// Requested resolution.
    pub resolution: Resolution,
    /// Window start (unix seconds).
    pub from: i64,
    /// Window end (unix seconds).
    pub to: i64,
}

#[derive(Debug, Default)]
struct InMemoryCrawlerState {
    symbols: Vec<Ticker>,
    history: HashMap<(String, Resolution), Vec<CrawledBar>>,
    failing: HashMap<String, CrawlerError>,
    snapshots: HashMap<String, StockSnapshot>,
    history_calls: Vec<HistoryCall>,
}

/// In-memory implementation of `Crawler` serving preset data.
///
/// History requests are answered with the preset bars inside the requested
/// window, like the upstream API.
#[derive(Debug, Default)]
pub struct InMemoryCrawler {
    state: RwLock<InMemoryCrawlerState>,
}

impl InMemoryCrawler {
    /// Create an empty crawler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the symbol list.
    pub fn set_symbols(&self, symbols: Vec<Ticker>) {
        self.state.write().symbols = symbols;
    }

    /// Set the available history for a symbol.
    pub fn set_history(&self, symbol: &str, resolution: Resolution, bars: Vec<CrawledBar>) {
        self.state
            .write()
            .history
            .insert((symbol.to_string(), resolution), bars);
    }

    /// Make history requests for `symbol` fail.
    pub fn fail_history(&self, symbol: &str, error: CrawlerError) {
        self.state.write().failing.insert(symbol.to_string(), error);
    }

    /// Set the snapshot served for a symbol.
    pub fn set_snapshot(&self, snapshot: StockSnapshot) {
        self.state
            .write()
            .snapshots
            .insert(snapshot.symbol.clone(), snapshot);
    }

    /// All history calls so far.
    #[must_use]
    pub fn history_calls(&self) -> Vec<HistoryCall> {
        self.state.read().history_calls.clone()
    }
}

#[async_trait]
impl Crawler for InMemoryCrawler {
    async fn fetch_symbols(&self) -> Result<Vec<Ticker>, CrawlerError> {
        Ok(self.state.read().symbols.clone())
    }

    async fn fetch_history(
        &self,
        symbol: &str,
        resolution: Resolution,
        from: i64,
        to: i64,
    ) -> Result<Vec<CrawledBar>, CrawlerError> {
        let mut state = self.state.write();
        state.history_calls.push(HistoryCall {
            symbol: symbol.to_string(),
            resolution,
            from,
            to,
        });
        if let Some(error) = state.failing.get(symbol) {
            return Err(error.clone());
        }
        Ok(state
            .history
            .get(&(symbol.to_string(), resolution))
            .map(|bars| {
                bars.iter()
                    .filter(|b| (from..=to).contains(&b.time.timestamp()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_snapshot(&self, symbols: &[String]) -> Result<Vec<StockSnapshot>, CrawlerError> {
        let state = self.state.read();
        Ok(symbols
            .iter()
            .filter_map(|s| state.snapshots.get(s).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn crawled(secs: i64) -> CrawledBar {
        CrawledBar {
            time: Utc.timestamp_opt(secs, 0).unwrap(),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1,
        }
    }

    #[tokio::test]
    async fn history_is_windowed_and_recorded() {
        let crawler = InMemoryCrawler::new();
        crawler.set_history(
            "ABC",
            Resolution::Daily,
            vec![crawled(10), crawled(20), crawled(30)],
        );

        let bars = crawler
            .fetch_history("ABC", Resolution::Daily, 15, 30)
            .await
            .unwrap();
        assert_eq!(bars.len(), 2);

        let calls = crawler.history_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].from, 15);
    }

    #[tokio::test]
    async fn failing_symbol() {
        let crawler = InMemoryCrawler::new();
        crawler.fail_history(
            "ABC",
            CrawlerError::Http {
                message: "boom".to_string(),
            },
        );
        assert!(
            crawler
                .fetch_history("ABC", Resolution::Daily, 0, 1)
                .await
                .is_err()
        );
    }
}
