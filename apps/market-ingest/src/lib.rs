#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Market Ingest - Equities Market Data Ingestion
//!
//! Keeps a time-series store of OHLCV bars and a key-value cache of quote
//! snapshots current for every active symbol on the supported exchanges.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Resolutions, bars, snapshots and decoded feed messages
//!   - `resolution`: bar resolution codes and partitions
//!   - `bar`: OHLCV bars and tickers
//!   - `snapshot`: stock snapshots and partial updates
//!   - `feed`: decoded live messages and decode errors
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: cache, time-series, crawler, stream and ticker registry
//!   - `services`: watermarks, bar store, sync orchestrator, snapshot
//!     cache, live stream and the driver loops
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `vnd`: upstream REST crawler, live feed connection and codec
//!   - `ssi`: alternate symbol and history crawler
//!   - `persistence`: Redis cache, InfluxDB time series, ticker registry
//!   - `config`: Configuration from the environment
//!   - `health`: Health check and metrics HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! REST history ──► SyncOrchestrator ──► BarStore ──► time series
//!                        │
//!                        └──► WatermarkStore ──► cache
//!
//! REST snapshot ──► SnapshotCache ◄── LiveStreamService ◄── live feed
//!                        │
//!                        └──► cache
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Market data types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::{
    Bar, DecodeError, DecodedMessage, MessageCategory, Resolution, ResolutionError, SnapshotField,
    SnapshotUpdate, StockSnapshot, Ticker,
};

// Services
pub use application::services::{
    BarStore, BarStoreConfig, Driver, IngestStatus, LiveStreamConfig, LiveStreamService,
    SnapshotCache, SyncConfig, SyncLoopConfig, SyncOrchestrator, TickerService, WatermarkStore,
};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, CrawlerSource, DriverSettings, InfluxCredentials, IngestConfig, ServerSettings,
    StorageSettings, StreamSettings, SyncSettings, UpstreamSettings,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Adapters
pub use infrastructure::persistence::{CachedTickerRepository, InfluxTimeSeries, RedisCache};
pub use infrastructure::ssi::{SsiEndpoints, SsiRestCrawler};
pub use infrastructure::vnd::{VndEndpoints, VndRestCrawler, VndStreamConnection, encode_frame};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
