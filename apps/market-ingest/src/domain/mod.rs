//! Domain Layer - Core market data types.
//!
//! Pure types and lookup tables with no I/O: resolutions, bars, tickers,
//! decoded feed messages and stock snapshots.

/// Resolution table (codes, partitions, provider tokens, durations).
pub mod resolution;

/// Price bars and tickers.
pub mod bar;

/// Decoded live feed messages and numeric coercion.
pub mod feed;

/// Stock snapshots and partial updates.
pub mod snapshot;

pub use bar::{Bar, Ticker, max_timestamp};
pub use feed::{DecodeError, DecodedMessage, MessageCategory, coerce_number};
pub use resolution::{Resolution, ResolutionError};
pub use snapshot::{FieldValue, SnapshotField, SnapshotUpdate, StockSnapshot};
