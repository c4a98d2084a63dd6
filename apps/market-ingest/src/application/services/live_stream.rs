//! Live Stream Service
//!
//! Supervised reconnect loop around a `StreamConnection`.
//!
//! # Session lifecycle
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> (Reading || Writing) -> Disconnected
//! ```
//!
//! Each session subscribes to the active symbols, then runs a keep-alive
//! writer and a frame reader concurrently. The first error from either loop
//! ends the session; the service closes the connection, sleeps the backoff
//! and starts over, forever, until cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ConnectionState, StreamConnection, StreamError};
use crate::application::services::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::services::{SnapshotCache, TickerService, TickerServiceError};
use crate::domain::{DecodedMessage, MessageCategory, SnapshotUpdate};
use crate::infrastructure::metrics;

/// Live stream session error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LiveStreamError {
    /// Connection, socket or decode failure.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// The active symbol list could not be loaded.
    #[error(transparent)]
    Tickers(#[from] TickerServiceError),
}

/// Live stream tuning.
#[derive(Debug, Clone)]
pub struct LiveStreamConfig {
    /// Interval between keep-alive frames.
    pub keep_alive_interval: Duration,
    /// Keep-alive frame payload.
    pub keep_alive_frame: String,
    /// Backoff between sessions.
    pub reconnect: ReconnectConfig,
}

impl Default for LiveStreamConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval: Duration::from_secs(10),
            keep_alive_frame: "1".to_string(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Control frames that subscribe to quote updates for `symbols`.
#[must_use]
pub fn subscribe_frames(symbols: &[String]) -> Vec<String> {
    let joined = symbols.join(",");
    vec![
        "a".to_string(),
        format!("s|S:{joined}"),
        format!("ss|S:code={joined}"),
    ]
}

/// Live stream driver.
pub struct LiveStreamService {
    connection: Arc<dyn StreamConnection>,
    snapshots: SnapshotCache,
    tickers: TickerService,
    config: LiveStreamConfig,
}

impl std::fmt::Debug for LiveStreamService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveStreamService")
            .field("state", &self.connection.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LiveStreamService {
    /// Create a new live stream service.
    #[must_use]
    pub fn new(
        connection: Arc<dyn StreamConnection>,
        snapshots: SnapshotCache,
        tickers: TickerService,
        config: LiveStreamConfig,
    ) -> Self {
        Self {
            connection,
            snapshots,
            tickers,
            config,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Run sessions until `cancel` fires.
    ///
    /// Returns early only if the reconnect policy has a finite attempt limit
    /// and it is exhausted.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.run_session(&cancel, &mut policy).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Live stream session ended");
                    self.connection.close().await;
                    metrics::set_stream_connected(false);

                    let Some(delay) = policy.next_delay() else {
                        tracing::error!(
                            attempts = policy.attempt_count(),
                            "Live stream reconnect attempts exhausted"
                        );
                        return;
                    };
                    metrics::record_reconnect();
                    tracing::info!(
                        attempt = policy.attempt_count(),
                        delay_ms = delay.as_millis(),
                        "Reconnecting to live stream"
                    );

                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.connection.close().await;
        metrics::set_stream_connected(false);
        tracing::info!("Live stream stopped");
    }

    /// One connect/subscribe/read session. `Ok` means cancelled.
    async fn run_session(
        self: &Arc<Self>,
        cancel: &CancellationToken,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), LiveStreamError> {
        self.connection.connect().await?;

        let symbols = self.tickers.active_symbols(true).await?;
        self.connection.write(&subscribe_frames(&symbols)).await?;
        policy.reset();
        metrics::set_stream_connected(true);
        tracing::info!(symbols = symbols.len(), "Live stream subscribed");

        let session = cancel.child_token();
        let (error_tx, mut error_rx) = mpsc::channel::<LiveStreamError>(2);

        let writer = tokio::spawn(Self::keep_alive_loop(
            Arc::clone(&self.connection),
            self.config.keep_alive_interval,
            self.config.keep_alive_frame.clone(),
            error_tx.clone(),
            session.clone(),
        ));
        let reader = tokio::spawn(Arc::clone(self).read_loop(error_tx, session.clone()));

        let result = tokio::select! {
            () = cancel.cancelled() => Ok(()),
            error = error_rx.recv() => Err(error.unwrap_or(LiveStreamError::Stream(StreamError::Closed))),
        };

        session.cancel();
        let _ = writer.await;
        let _ = reader.await;
        result
    }

    async fn keep_alive_loop(
        connection: Arc<dyn StreamConnection>,
        interval: Duration,
        frame: String,
        errors: mpsc::Sender<LiveStreamError>,
        session: CancellationToken,
    ) {
        let frames = [frame];
        loop {
            tokio::select! {
                () = session.cancelled() => break,
                () = tokio::time::sleep(interval) => {
                    if let Err(e) = connection.write(&frames).await {
                        let _ = errors.send(e.into()).await;
                        break;
                    }
                }
            }
        }
    }

    async fn read_loop(self: Arc<Self>, errors: mpsc::Sender<LiveStreamError>, session: CancellationToken) {
        loop {
            tokio::select! {
                () = session.cancelled() => break,
                read = self.connection.read() => match read {
                    Ok(message) => {
                        if let Err(e) = self.dispatch(&message).await {
                            let _ = errors.send(e.into()).await;
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = errors.send(e.into()).await;
                        break;
                    }
                },
            }
        }
    }

    /// Route a decoded frame. Quote frames patch the snapshot cache; other
    /// categories are validated by decoding and then dropped.
    async fn dispatch(&self, message: &DecodedMessage) -> Result<(), StreamError> {
        metrics::record_frame_decoded(message.category);

        match message.category {
            MessageCategory::Quote => {
                let Some(update) = SnapshotUpdate::from_message(message)? else {
                    return Ok(());
                };
                if update.is_empty() {
                    return Ok(());
                }
                // Cache failures are transient; the next frame or refresh repairs the record.
                if let Err(e) = self.snapshots.apply_partial(&update).await {
                    tracing::warn!(symbol = %update.symbol, error = %e, "Failed to apply live update");
                }
            }
            MessageCategory::Derivative | MessageCategory::Index => {
                tracing::trace!(
                    category = message.category.as_str(),
                    subtype = %message.subtype,
                    "Dropping unconsumed frame"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use parking_lot::{Mutex, RwLock};

    use super::*;
    use crate::application::ports::{
        InMemoryCache, InMemoryCrawler, InMemoryTickerRepository, KeyValueCache,
    };
    use crate::domain::{DecodeError, Ticker};

    /// Scripted connection: reads come from a channel, writes are recorded.
    struct ScriptedConnection {
        state: RwLock<ConnectionState>,
        connects: Mutex<usize>,
        writes: Mutex<Vec<String>>,
        reads: tokio::sync::Mutex<mpsc::Receiver<Result<DecodedMessage, StreamError>>>,
    }

    #[async_trait]
    impl StreamConnection for ScriptedConnection {
        async fn connect(&self) -> Result<(), StreamError> {
            *self.connects.lock() += 1;
            *self.state.write() = ConnectionState::Connected;
            Ok(())
        }

        async fn write(&self, frames: &[String]) -> Result<(), StreamError> {
            self.writes.lock().extend(frames.iter().cloned());
            Ok(())
        }

        async fn read(&self) -> Result<DecodedMessage, StreamError> {
            let next = self.reads.lock().await.recv().await;
            let result = next.unwrap_or(Err(StreamError::Closed));
            if result.is_err() {
                *self.state.write() = ConnectionState::Disconnected;
            }
            result
        }

        fn state(&self) -> ConnectionState {
            *self.state.read()
        }

        async fn close(&self) {
            *self.state.write() = ConnectionState::Disconnected;
        }
    }

    fn quote(symbol: &str, match_price: &str) -> DecodedMessage {
        DecodedMessage {
            category: MessageCategory::Quote,
            subtype: "SMA".to_string(),
            fields: HashMap::from([
                ("code".to_string(), symbol.to_string()),
                ("matchPrice".to_string(), match_price.to_string()),
                ("highestPrice".to_string(), String::new()),
            ]),
        }
    }

    #[test]
    fn subscribe_frame_format() {
        let frames = subscribe_frames(&["FPT".to_string(), "VNM".to_string()]);
        assert_eq!(frames, vec!["a", "s|S:FPT,VNM", "ss|S:code=FPT,VNM"]);
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn applies_quotes_and_reconnects_on_error() {
        let (read_tx, read_rx) = mpsc::channel(16);
        let connection = Arc::new(ScriptedConnection {
            state: RwLock::new(ConnectionState::Disconnected),
            connects: Mutex::new(0),
            writes: Mutex::new(Vec::new()),
            reads: tokio::sync::Mutex::new(read_rx),
        });
        let cache: Arc<dyn KeyValueCache> = Arc::new(InMemoryCache::new());
        let crawler = Arc::new(InMemoryCrawler::new());
        let snapshots = SnapshotCache::new(Arc::clone(&cache), crawler.clone());
        let tickers = TickerService::new(
            Arc::new(InMemoryTickerRepository::with_tickers([
                Ticker::new("FPT", "HOSE").with_active(true),
            ])),
            Arc::clone(&cache),
            crawler,
            Vec::new(),
        );
        let service = Arc::new(LiveStreamService::new(
            connection.clone(),
            snapshots.clone(),
            tickers,
            LiveStreamConfig {
                keep_alive_interval: Duration::from_secs(60),
                keep_alive_frame: "1".to_string(),
                reconnect: ReconnectConfig::fixed(Duration::from_millis(5)),
            },
        ));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&service).run(cancel.clone()));

        read_tx.send(Ok(quote("FPT", "101.5"))).await.unwrap();
        wait_until(|| connection.writes.lock().len() >= 3).await;
        let mut applied = None;
        for _ in 0..200 {
            applied = snapshots.get("FPT").await.unwrap();
            if applied.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let applied = applied.unwrap();
        assert_eq!(applied.match_price, 101.5);
        assert_eq!(applied.highest_price, 0.0);

        let unsupported = DecodeError::UnsupportedMessage {
            category: "X".to_string(),
            subtype: String::new(),
        };
        read_tx.send(Err(unsupported.into())).await.unwrap();
        wait_until(|| *connection.connects.lock() >= 2).await;
        wait_until(|| connection.writes.lock().len() >= 6).await;

        let writes = connection.writes.lock().clone();
        assert_eq!(writes[..3], writes[3..6]);
        assert_eq!(writes[1], "s|S:FPT");

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(service.state(), ConnectionState::Disconnected);
    }
}
