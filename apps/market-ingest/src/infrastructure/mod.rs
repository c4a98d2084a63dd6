//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Upstream broker adapters (REST crawler, live feed, frame codec).
pub mod vnd;

/// Alternate upstream source for symbols and history.
pub mod ssi;

/// HTTP client shared by the REST crawlers.
pub(crate) mod http_client;

/// Redis, InfluxDB and ticker registry adapters.
pub mod persistence;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
