//! Bars and tickers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV price bar.
///
/// Identity is `(symbol, exchange, partition, timestamp)`; re-ingesting the
/// same identity replaces the stored bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Instrument symbol.
    pub symbol: String,
    /// Listing exchange; used as the time-series measurement.
    pub exchange: String,
    /// Bar open time (UTC).
    pub time: DateTime<Utc>,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Traded volume.
    pub volume: i64,
}

impl Bar {
    /// Bar time as unix seconds.
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.time.timestamp()
    }

    /// UTC calendar day of the bar.
    #[must_use]
    pub fn day(&self) -> NaiveDate {
        self.time.date_naive()
    }
}

/// Newest timestamp in a batch, or `None` for an empty batch.
#[must_use]
pub fn max_timestamp(bars: &[Bar]) -> Option<i64> {
    bars.iter().map(Bar::timestamp).max()
}

/// A listed instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    /// Unique symbol.
    pub symbol: String,
    /// Listing exchange.
    pub exchange: String,
    /// Full company name.
    pub full_name: String,
    /// Short display name.
    pub short_name: String,
    /// Instrument type (stock, ETF, ...).
    pub instrument_type: String,
    /// Whether the symbol is eligible for ingestion.
    pub is_active: bool,
}

impl Ticker {
    /// Create an inactive ticker with empty names.
    #[must_use]
    pub fn new(symbol: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: exchange.into(),
            full_name: String::new(),
            short_name: String::new(),
            instrument_type: "Stock".to_string(),
            is_active: false,
        }
    }

    /// Builder-style active flag.
    #[must_use]
    pub const fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }
}
