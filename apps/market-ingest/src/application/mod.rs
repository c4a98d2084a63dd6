//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external systems (cache, time series, crawler, stream).
pub mod ports;

/// Application services for sync, snapshots and the live stream.
pub mod services;
