//! Configuration Module
//!
//! Environment-driven settings for the ingestion service.

mod settings;

pub use settings::{
    ConfigError, CrawlerSource, DriverSettings, InfluxCredentials, IngestConfig, ServerSettings,
    StorageSettings, StreamSettings, SyncSettings, UpstreamSettings,
};
