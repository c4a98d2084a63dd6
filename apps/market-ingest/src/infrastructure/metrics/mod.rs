//! Prometheus Metrics Module
//!
//! Exposes ingestion metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Sync**: bars written, symbols synced, sync run duration
//! - **Stream**: frames decoded, decode failures, reconnects, connection state
//! - **Snapshots**: full and partial snapshot writes
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! before `init_metrics` is a no-op.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::{MessageCategory, Resolution};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed (another global recorder is
/// already set). Only called once at process start.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Sync
    describe_counter!(
        "market_ingest_bars_written_total",
        "Total bars written to the time-series store by partition"
    );
    describe_counter!(
        "market_ingest_symbols_synced_total",
        "Total per-symbol sync attempts by resolution and outcome"
    );
    describe_histogram!(
        "market_ingest_sync_duration_seconds",
        "Duration of sync runs by resolution"
    );

    // Stream
    describe_counter!(
        "market_ingest_frames_decoded_total",
        "Total live frames decoded by category"
    );
    describe_counter!(
        "market_ingest_decode_failures_total",
        "Total live frames that failed to decode"
    );
    describe_counter!(
        "market_ingest_stream_reconnects_total",
        "Total live stream reconnection attempts"
    );
    describe_gauge!(
        "market_ingest_stream_connected",
        "Whether the live stream is connected (1) or not (0)"
    );

    // Snapshots
    describe_counter!(
        "market_ingest_snapshot_writes_total",
        "Total snapshot cache writes by kind"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for per-symbol sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcomeLabel {
    /// The symbol synced.
    Success,
    /// The symbol failed.
    Failure,
}

impl SyncOutcomeLabel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Kind label for snapshot writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotWriteKind {
    /// Wholesale replace from a bulk pull.
    Full,
    /// Field merge from a live update.
    Partial,
}

impl SnapshotWriteKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Partial => "partial",
        }
    }
}

/// Record bars written to a partition.
pub fn record_bars_written(partition: &str, count: usize) {
    counter!(
        "market_ingest_bars_written_total",
        "partition" => partition.to_string()
    )
    .increment(count as u64);
}

/// Record one per-symbol sync outcome.
pub fn record_symbol_synced(resolution: Resolution, outcome: SyncOutcomeLabel) {
    counter!(
        "market_ingest_symbols_synced_total",
        "resolution" => resolution.code(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record the duration of a sync run.
pub fn record_sync_duration(resolution: Resolution, duration: Duration) {
    histogram!(
        "market_ingest_sync_duration_seconds",
        "resolution" => resolution.code()
    )
    .record(duration.as_secs_f64());
}

/// Record a decoded live frame.
pub fn record_frame_decoded(category: MessageCategory) {
    counter!(
        "market_ingest_frames_decoded_total",
        "category" => category.as_str()
    )
    .increment(1);
}

/// Record a live frame that failed to decode.
pub fn record_decode_failure(error_type: &'static str) {
    counter!(
        "market_ingest_decode_failures_total",
        "error_type" => error_type
    )
    .increment(1);
}

/// Record a live stream reconnect attempt.
pub fn record_reconnect() {
    counter!("market_ingest_stream_reconnects_total").increment(1);
}

/// Set the live stream connection gauge.
pub fn set_stream_connected(connected: bool) {
    gauge!("market_ingest_stream_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record snapshot cache writes.
pub fn record_snapshot_writes(kind: SnapshotWriteKind, count: usize) {
    counter!(
        "market_ingest_snapshot_writes_total",
        "kind" => kind.as_str()
    )
    .increment(count as u64);
}
