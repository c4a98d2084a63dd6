//! Application Services
//!
//! Use cases that coordinate the domain with the ports.
//!
//! - `WatermarkStore`: per (symbol, resolution) high-water marks
//! - `BarStore`: bar persistence and last-N queries
//! - `TickerService`: symbol discovery and the active ticker list
//! - `SnapshotCache`: full and partial snapshot writes
//! - `SyncOrchestrator`: incremental historical sync
//! - `LiveStreamService`: supervised live feed
//! - `drivers`: the long-running loops

mod bar_store;
pub mod drivers;
mod live_stream;
pub mod reconnect;
mod snapshot_cache;
mod sync_orchestrator;
mod ticker_service;
mod watermark_store;

pub use bar_store::{BarStore, BarStoreConfig, BarStoreError, decode_point, encode_bar, estimate_from};
pub use drivers::{Driver, IngestStatus, SyncLoopConfig, UnknownDriver};
pub use live_stream::{LiveStreamConfig, LiveStreamError, LiveStreamService, subscribe_frames};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use snapshot_cache::{SnapshotCache, SnapshotError};
pub use sync_orchestrator::{
    EPOCH_FLOOR, OverwritePolicy, RollupAction, RollupOutcome, SymbolFailure, SyncConfig,
    SyncError, SyncOrchestrator, SyncOutcome, SyncReport,
};
pub use ticker_service::{ACTIVE_TICKERS_KEY, ACTIVE_TICKERS_TTL, TickerService, TickerServiceError};
pub use watermark_store::WatermarkStore;
