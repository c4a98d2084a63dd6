//! Market Ingest Binary
//!
//! Starts the enabled ingestion drivers and the health server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-ingest
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `REDIS_URL`: key-value cache (`redis://host:port/db`)
//!
//! ## Optional
//! - `INFLUX_URL`, `INFLUX_ORG`, `INFLUX_TOKEN`: time-series backend
//!   (in-memory when `INFLUX_URL` is unset)
//! - `CRAWLER_SOURCE`: `VND` or `SSI` for symbols and history (default: VND)
//! - `INGEST_DRIVERS`: comma-separated drivers to run (default: all)
//! - `DEFAULT_ACTIVE_SYMBOLS`: symbols active on first discovery
//! - `INGEST_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use market_ingest::application::ports::{
    Crawler, InMemoryTimeSeries, KeyValueCache, StreamConnection, TimeSeriesBackend,
};
use market_ingest::application::services::drivers::{
    run_discovery_loop, run_minute_once, run_snapshot_loop, run_sync_loop,
};
use market_ingest::infrastructure::telemetry;
use market_ingest::{
    BarStore, CachedTickerRepository, CrawlerSource, Driver, HealthServer, HealthServerState,
    InfluxTimeSeries, IngestConfig, IngestStatus, LiveStreamService, RedisCache, Resolution,
    SnapshotCache, SsiRestCrawler, SyncLoopConfig, SyncOrchestrator, TickerService,
    VndRestCrawler, VndStreamConnection, WatermarkStore, init_metrics,
};
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Market Ingest");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = IngestConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Storage adapters
    let cache: Arc<dyn KeyValueCache> = Arc::new(
        RedisCache::connect(&config.storage.redis_url)
            .await
            .context("failed to connect to Redis")?,
    );
    let time_series: Arc<dyn TimeSeriesBackend> = match &config.storage.influx {
        Some(influx) => Arc::new(
            InfluxTimeSeries::new(
                influx.url(),
                influx.org(),
                influx.token(),
                config.upstream.request_timeout,
            )
            .context("failed to build InfluxDB client")?,
        ),
        None => {
            tracing::warn!("INFLUX_URL not set, bars are kept in memory only");
            Arc::new(InMemoryTimeSeries::new())
        }
    };

    // Upstream crawlers; snapshots always come from VND
    let vnd_crawler: Arc<dyn Crawler> = Arc::new(
        VndRestCrawler::new(
            config.upstream.endpoints.clone(),
            config.upstream.request_timeout,
        )
        .context("failed to build upstream HTTP client")?,
    );
    let crawler: Arc<dyn Crawler> = match config.upstream.source {
        CrawlerSource::Vnd => Arc::clone(&vnd_crawler),
        CrawlerSource::Ssi => {
            if config.drivers.is_enabled(Driver::Hourly) {
                tracing::warn!("SSI serves no hourly bars, the hourly driver will fail every run");
            }
            Arc::new(
                SsiRestCrawler::new(
                    config.upstream.ssi_endpoints.clone(),
                    config.upstream.request_timeout,
                )
                .context("failed to build SSI HTTP client")?,
            )
        }
    };

    // Services
    let tickers = TickerService::new(
        Arc::new(CachedTickerRepository::new(Arc::clone(&cache))),
        Arc::clone(&cache),
        Arc::clone(&crawler),
        config.default_active.clone(),
    );
    let orchestrator = Arc::new(SyncOrchestrator::new(
        Arc::clone(&crawler),
        WatermarkStore::new(Arc::clone(&cache)),
        BarStore::new(time_series, config.sync.bar_store()),
        tickers.clone(),
        config.sync.orchestrator(),
    ));
    let snapshots = SnapshotCache::new(Arc::clone(&cache), vnd_crawler);
    let status = Arc::new(IngestStatus::new());

    let mut tasks = JoinSet::new();

    // Live stream
    let stream_connection: Option<Arc<dyn StreamConnection>> =
        if config.drivers.is_enabled(Driver::Stream) {
            let connection: Arc<dyn StreamConnection> =
                Arc::new(VndStreamConnection::new(config.upstream.stream_url.clone()));
            let service = Arc::new(LiveStreamService::new(
                Arc::clone(&connection),
                snapshots.clone(),
                tickers.clone(),
                config.stream.live_stream(),
            ));
            tasks.spawn(service.run(shutdown_token.clone()));
            Some(connection)
        } else {
            None
        };

    // Historical sync
    let sync_loops = [
        (Driver::Daily, Resolution::Daily, config.drivers.daily_interval),
        (Driver::Hourly, Resolution::Minute60, config.drivers.hourly_interval),
    ];
    for (driver, resolution, interval) in sync_loops {
        if config.drivers.is_enabled(driver) {
            tasks.spawn(run_sync_loop(
                Arc::clone(&orchestrator),
                SyncLoopConfig {
                    resolution,
                    interval,
                    download_concurrency: config.sync.download_concurrency,
                    write_concurrency: config.sync.write_concurrency,
                },
                Arc::clone(&status),
                shutdown_token.clone(),
            ));
        }
    }

    if config.drivers.is_enabled(Driver::Minute) {
        let orchestrator = Arc::clone(&orchestrator);
        let tickers = tickers.clone();
        let concurrency = config.sync.download_concurrency;
        let status = Arc::clone(&status);
        let cancel = shutdown_token.clone();
        tasks.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                _ = run_minute_once(orchestrator, tickers, concurrency, status) => {}
            }
        });
    }

    if config.drivers.is_enabled(Driver::Snapshot) {
        tasks.spawn(run_snapshot_loop(
            snapshots.clone(),
            tickers.clone(),
            config.drivers.snapshot_batch_size,
            config.drivers.snapshot_interval,
            Arc::clone(&status),
            shutdown_token.clone(),
        ));
    }

    if config.drivers.is_enabled(Driver::Discovery) {
        tasks.spawn(run_discovery_loop(
            tickers.clone(),
            config.drivers.discovery_interval,
            Arc::clone(&status),
            shutdown_token.clone(),
        ));
    }

    // Spawn health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&status),
        stream_connection,
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tasks.spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!(tasks = tasks.len(), "Market ingest ready");

    await_shutdown(shutdown_token).await;

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Task panicked during shutdown");
            }
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            remaining = tasks.len(),
            "Shutdown timeout elapsed, aborting remaining tasks"
        );
        tasks.abort_all();
    }

    tracing::info!("Market ingest stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &IngestConfig) {
    let drivers: Vec<&str> = config.drivers.enabled.iter().map(|d| d.as_str()).collect();
    tracing::info!(
        crawler_source = config.upstream.source.as_str(),
        drivers = %drivers.join(","),
        influx = config.storage.influx.is_some(),
        health_port = config.server.health_port,
        default_active = config.default_active.len(),
        "Configuration loaded"
    );
    tracing::debug!(
        symbols_url = %config.upstream.endpoints.symbols_url,
        history_url = %config.upstream.endpoints.history_url,
        snapshot_url = %config.upstream.endpoints.snapshot_url,
        ssi_symbols_url = %config.upstream.ssi_endpoints.symbols_url,
        ssi_history_url = %config.upstream.ssi_endpoints.history_url,
        stream_url = %config.upstream.stream_url,
        "Upstream endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
