//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. Each port ships with an in-memory
//! adapter used by tests and local runs.
//!
//! ## Driven Ports (Outbound)
//!
//! - `KeyValueCache`: watermarks, snapshots, ticker lists
//! - `TimeSeriesBackend`: partitioned bar storage
//! - `Crawler`: upstream symbols, history and snapshots
//! - `StreamConnection`: live feed connection
//! - `TickerRepository`: ticker registry

mod cache_port;
mod crawler_port;
mod stream_port;
mod ticker_repository_port;
mod time_series_port;

pub use cache_port::{CacheError, InMemoryCache, KeyValueCache, get_json, set_json};
pub use crawler_port::{CrawledBar, Crawler, CrawlerError, HistoryCall, InMemoryCrawler};
pub use stream_port::{ConnectionState, StreamConnection, StreamError};
pub(crate) use ticker_repository_port::merge_new;
pub use ticker_repository_port::{
    InMemoryTickerRepository, TickerRepository, TickerRepositoryError,
};
pub use time_series_port::{
    InMemoryTimeSeries, Point, PointQuery, PointValue, TimeSeriesBackend, TimeSeriesError,
};
