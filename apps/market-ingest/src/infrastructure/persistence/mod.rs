//! Storage Adapters
//!
//! Production implementations of the cache, time-series and ticker
//! registry ports.

mod influx;
mod redis_cache;
mod ticker_registry;

pub use influx::{InfluxTimeSeries, flux_query, line_protocol};
pub use redis_cache::RedisCache;
pub use ticker_registry::{CachedTickerRepository, REGISTRY_KEY};
