//! Ingest Configuration Settings
//!
//! Configuration types for the ingestion service, loaded from environment
//! variables.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::TimeDelta;

use crate::application::services::{
    BarStoreConfig, Driver, LiveStreamConfig, ReconnectConfig, SyncConfig,
};
use crate::infrastructure::ssi::SsiEndpoints;
use crate::infrastructure::vnd::{DEFAULT_STREAM_URL, VndEndpoints};

/// Source of raw settings, keyed by variable name.
type Source<'a> = dyn Fn(&str) -> Option<String> + 'a;

/// Broker serving symbol lists and history.
///
/// Snapshots and the live feed always come from VND.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrawlerSource {
    /// VNDirect.
    #[default]
    Vnd,
    /// SSI.
    Ssi,
}

impl CrawlerSource {
    /// Parse a source name, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "VND" => Some(Self::Vnd),
            "SSI" => Some(Self::Ssi),
            _ => None,
        }
    }

    /// Get the source name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Vnd => "VND",
            Self::Ssi => "SSI",
        }
    }
}

/// InfluxDB connection credentials.
#[derive(Clone)]
pub struct InfluxCredentials {
    url: String,
    org: String,
    token: String,
}

impl InfluxCredentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(url: String, org: String, token: String) -> Self {
        Self { url, org, token }
    }

    /// Server base URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Organization name.
    #[must_use]
    pub fn org(&self) -> &str {
        &self.org
    }

    /// API token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for InfluxCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxCredentials")
            .field("url", &self.url)
            .field("org", &self.org)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Storage settings.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Redis URL for the key-value cache.
    pub redis_url: String,
    /// Time-series backend; in-memory when `None`.
    pub influx: Option<InfluxCredentials>,
}

/// Upstream endpoint settings.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// Broker for symbols and history.
    pub source: CrawlerSource,
    /// VND REST endpoints.
    pub endpoints: VndEndpoints,
    /// SSI REST endpoints.
    pub ssi_endpoints: SsiEndpoints,
    /// Live feed WebSocket URL.
    pub stream_url: String,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            source: CrawlerSource::default(),
            endpoints: VndEndpoints::default(),
            ssi_endpoints: SsiEndpoints::default(),
            stream_url: DEFAULT_STREAM_URL.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Historical sync settings.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Concurrent downloads in a sync run.
    pub download_concurrency: usize,
    /// Concurrent symbol writes in a sync run.
    pub write_concurrency: usize,
    /// Bars per time-series write.
    pub bar_insert_batch_size: usize,
    /// Concurrent time-series writes per batch.
    pub bar_write_concurrency: usize,
    /// Initial intraday window in days.
    pub intraday_lookback_days: i64,
    /// Trading minutes per session.
    pub session_minutes: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            download_concurrency: 8,
            write_concurrency: 8,
            bar_insert_batch_size: 500,
            bar_write_concurrency: 8,
            intraday_lookback_days: 30,
            session_minutes: 270,
        }
    }
}

impl SyncSettings {
    /// Bar store tuning.
    #[must_use]
    pub const fn bar_store(&self) -> BarStoreConfig {
        BarStoreConfig {
            batch_size: self.bar_insert_batch_size,
            write_concurrency: self.bar_write_concurrency,
            session_minutes: Some(self.session_minutes),
        }
    }

    /// Orchestrator tuning.
    #[must_use]
    pub const fn orchestrator(&self) -> SyncConfig {
        SyncConfig {
            intraday_lookback: TimeDelta::days(self.intraday_lookback_days),
        }
    }
}

/// Driver loop settings.
#[derive(Debug, Clone)]
pub struct DriverSettings {
    /// Enabled drivers.
    pub enabled: BTreeSet<Driver>,
    /// Daily sync loop interval.
    pub daily_interval: Duration,
    /// Hourly sync loop interval.
    pub hourly_interval: Duration,
    /// Snapshot refresh interval.
    pub snapshot_interval: Duration,
    /// Symbols per snapshot request.
    pub snapshot_batch_size: usize,
    /// Symbol discovery interval.
    pub discovery_interval: Duration,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            enabled: Driver::ALL.into_iter().collect(),
            daily_interval: Duration::from_secs(30),
            hourly_interval: Duration::from_secs(60),
            snapshot_interval: Duration::from_secs(30),
            snapshot_batch_size: 100,
            discovery_interval: Duration::from_secs(600),
        }
    }
}

impl DriverSettings {
    /// Whether `driver` should run.
    #[must_use]
    pub fn is_enabled(&self, driver: Driver) -> bool {
        self.enabled.contains(&driver)
    }
}

/// Live stream settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Interval between keep-alive frames.
    pub keep_alive_interval: Duration,
    /// Delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Jitter factor applied to the reconnect delay.
    pub reconnect_jitter: f64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            keep_alive_interval: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(10),
            reconnect_jitter: 0.1,
        }
    }
}

impl StreamSettings {
    /// Live stream tuning. The stream reconnects forever.
    #[must_use]
    pub fn live_stream(&self) -> LiveStreamConfig {
        LiveStreamConfig {
            keep_alive_interval: self.keep_alive_interval,
            reconnect: ReconnectConfig {
                initial_delay: self.reconnect_delay,
                max_delay: self.reconnect_delay,
                multiplier: 1.0,
                jitter_factor: self.reconnect_jitter,
                max_attempts: 0,
            },
            ..LiveStreamConfig::default()
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check and metrics HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8082 }
    }
}

/// Complete ingest configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Storage settings.
    pub storage: StorageSettings,
    /// Upstream endpoints.
    pub upstream: UpstreamSettings,
    /// Sync settings.
    pub sync: SyncSettings,
    /// Driver settings.
    pub drivers: DriverSettings,
    /// Live stream settings.
    pub stream: StreamSettings,
    /// Symbols marked active when first discovered.
    pub default_active: Vec<String>,
    /// Server port settings.
    pub server: ServerSettings,
}

impl IngestConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or a
    /// value cannot be interpreted.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`IngestConfig::from_env`].
    pub fn from_source(source: &Source<'_>) -> Result<Self, ConfigError> {
        let redis_url = required(source, "REDIS_URL")?;

        let influx = match non_empty(source, "INFLUX_URL") {
            Some(url) => Some(InfluxCredentials::new(
                url,
                required(source, "INFLUX_ORG")?,
                required(source, "INFLUX_TOKEN")?,
            )),
            None => None,
        };

        let upstream_defaults = UpstreamSettings::default();
        let source_name = non_empty(source, "CRAWLER_SOURCE");
        let crawler_source = match source_name {
            Some(name) => CrawlerSource::from_str_case_insensitive(&name).ok_or_else(|| {
                ConfigError::InvalidValue {
                    key: "CRAWLER_SOURCE".to_string(),
                    message: format!("unsupported crawler source: {name}"),
                }
            })?,
            None => upstream_defaults.source,
        };
        let upstream = UpstreamSettings {
            source: crawler_source,
            endpoints: VndEndpoints {
                symbols_url: non_empty(source, "VND_SYMBOLS_URL")
                    .unwrap_or(upstream_defaults.endpoints.symbols_url),
                history_url: non_empty(source, "VND_HISTORY_URL")
                    .unwrap_or(upstream_defaults.endpoints.history_url),
                snapshot_url: non_empty(source, "VND_SNAPSHOT_URL")
                    .unwrap_or(upstream_defaults.endpoints.snapshot_url),
            },
            ssi_endpoints: SsiEndpoints {
                symbols_url: non_empty(source, "SSI_SYMBOLS_URL")
                    .unwrap_or(upstream_defaults.ssi_endpoints.symbols_url),
                history_url: non_empty(source, "SSI_HISTORY_URL")
                    .unwrap_or(upstream_defaults.ssi_endpoints.history_url),
            },
            stream_url: non_empty(source, "VND_STREAM_URL").unwrap_or(upstream_defaults.stream_url),
            request_timeout: parse_env_duration_secs(
                source,
                "INGEST_REQUEST_TIMEOUT_SECS",
                upstream_defaults.request_timeout,
            ),
        };

        let sync_defaults = SyncSettings::default();
        let sync = SyncSettings {
            download_concurrency: parse_env_usize(
                source,
                "INGEST_DOWNLOAD_CONCURRENCY",
                sync_defaults.download_concurrency,
            ),
            write_concurrency: parse_env_usize(
                source,
                "INGEST_WRITE_CONCURRENCY",
                sync_defaults.write_concurrency,
            ),
            bar_insert_batch_size: parse_env_usize(
                source,
                "INGEST_BAR_INSERT_BATCH_SIZE",
                sync_defaults.bar_insert_batch_size,
            ),
            bar_write_concurrency: parse_env_usize(
                source,
                "INGEST_BAR_WRITE_CONCURRENCY",
                sync_defaults.bar_write_concurrency,
            ),
            intraday_lookback_days: parse_env_i64(
                source,
                "INGEST_INTRADAY_LOOKBACK_DAYS",
                sync_defaults.intraday_lookback_days,
            ),
            session_minutes: parse_env_u32(
                source,
                "INGEST_SESSION_MINUTES",
                sync_defaults.session_minutes,
            ),
        };

        let driver_defaults = DriverSettings::default();
        let drivers = DriverSettings {
            enabled: match non_empty(source, "INGEST_DRIVERS") {
                Some(list) => parse_drivers(&list)?,
                None => driver_defaults.enabled,
            },
            daily_interval: parse_env_duration_secs(
                source,
                "INGEST_DAILY_INTERVAL_SECS",
                driver_defaults.daily_interval,
            ),
            hourly_interval: parse_env_duration_secs(
                source,
                "INGEST_HOURLY_INTERVAL_SECS",
                driver_defaults.hourly_interval,
            ),
            snapshot_interval: parse_env_duration_secs(
                source,
                "INGEST_SNAPSHOT_INTERVAL_SECS",
                driver_defaults.snapshot_interval,
            ),
            snapshot_batch_size: parse_env_usize(
                source,
                "INGEST_SNAPSHOT_BATCH_SIZE",
                driver_defaults.snapshot_batch_size,
            ),
            discovery_interval: parse_env_duration_secs(
                source,
                "INGEST_DISCOVERY_INTERVAL_SECS",
                driver_defaults.discovery_interval,
            ),
        };

        let stream_defaults = StreamSettings::default();
        let stream = StreamSettings {
            keep_alive_interval: parse_env_duration_secs(
                source,
                "STREAM_KEEP_ALIVE_INTERVAL_SECS",
                stream_defaults.keep_alive_interval,
            ),
            reconnect_delay: parse_env_duration_millis(
                source,
                "STREAM_RECONNECT_DELAY_MS",
                stream_defaults.reconnect_delay,
            ),
            reconnect_jitter: parse_env_f64(
                source,
                "STREAM_RECONNECT_JITTER",
                stream_defaults.reconnect_jitter,
            ),
        };

        let default_active = non_empty(source, "DEFAULT_ACTIVE_SYMBOLS")
            .map(|list| parse_list(&list))
            .unwrap_or_default();

        let server = ServerSettings {
            health_port: parse_env_u16(
                source,
                "INGEST_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        Ok(Self {
            storage: StorageSettings { redis_url, influx },
            upstream,
            sync,
            drivers,
            stream,
            default_active,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be interpreted.
    #[error("invalid value for {key}: {message}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Error details.
        message: String,
    },
}

fn required(source: &Source<'_>, key: &str) -> Result<String, ConfigError> {
    let value = source(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn non_empty(source: &Source<'_>, key: &str) -> Option<String> {
    source(key).filter(|v| !v.trim().is_empty())
}

fn parse_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_drivers(list: &str) -> Result<BTreeSet<Driver>, ConfigError> {
    parse_list(list)
        .iter()
        .map(|name| {
            name.parse::<Driver>().map_err(|e| ConfigError::InvalidValue {
                key: "INGEST_DRIVERS".to_string(),
                message: e.to_string(),
            })
        })
        .collect()
}

fn parse_env<T: std::str::FromStr>(source: &Source<'_>, key: &str, default: T) -> T {
    source(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_u16(source: &Source<'_>, key: &str, default: u16) -> u16 {
    parse_env(source, key, default)
}

fn parse_env_u32(source: &Source<'_>, key: &str, default: u32) -> u32 {
    parse_env(source, key, default)
}

fn parse_env_i64(source: &Source<'_>, key: &str, default: i64) -> i64 {
    parse_env(source, key, default)
}

fn parse_env_usize(source: &Source<'_>, key: &str, default: usize) -> usize {
    parse_env(source, key, default)
}

fn parse_env_f64(source: &Source<'_>, key: &str, default: f64) -> f64 {
    parse_env(source, key, default)
}

fn parse_env_duration_secs(source: &Source<'_>, key: &str, default: Duration) -> Duration {
    source(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(source: &Source<'_>, key: &str, default: Duration) -> Duration {
    source(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
