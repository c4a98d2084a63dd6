//! Live Stream Connection
//!
//! WebSocket adapter for the `StreamConnection` port. The socket is split
//! into a sink (control frames, keep-alives) and a source (data frames), each
//! behind its own async lock so the keep-alive writer never waits on a
//! pending read. Connection state lives inside the instance.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{ConnectionState, StreamConnection, StreamError};
use crate::domain::{DecodeError, DecodedMessage};
use crate::infrastructure::metrics;

use super::codec::decode_frame;

/// Default live feed endpoint.
pub const DEFAULT_STREAM_URL: &str = "wss://price-api-free.vndirect.com.vn/realtime";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket live feed connection.
pub struct VndStreamConnection {
    url: String,
    state: RwLock<ConnectionState>,
    connect_lock: Mutex<()>,
    sink: Mutex<Option<SplitSink<Socket, Message>>>,
    source: Mutex<Option<SplitStream<Socket>>>,
}

impl std::fmt::Debug for VndStreamConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VndStreamConnection")
            .field("url", &self.url)
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

impl VndStreamConnection {
    /// Create a disconnected connection for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: RwLock::new(ConnectionState::Disconnected),
            connect_lock: Mutex::new(()),
            sink: Mutex::new(None),
            source: Mutex::new(None),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    fn mark_disconnected(&self) {
        self.set_state(ConnectionState::Disconnected);
        metrics::set_stream_connected(false);
    }

    fn socket_error(&self, error: &tokio_tungstenite::tungstenite::Error) -> StreamError {
        self.mark_disconnected();
        StreamError::Socket {
            message: error.to_string(),
        }
    }
}

const fn failure_label(error: &DecodeError) -> &'static str {
    match error {
        DecodeError::UnsupportedMessage { .. } => "unsupported_message",
        DecodeError::MalformedField { .. } => "malformed_field",
        DecodeError::MalformedFrame(_) => "malformed_frame",
    }
}

#[async_trait]
impl StreamConnection for VndStreamConnection {
    async fn connect(&self) -> Result<(), StreamError> {
        let _guard = self.connect_lock.lock().await;
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }

        // Drop a half-dead socket from a previous session.
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        self.source.lock().await.take();

        self.set_state(ConnectionState::Connecting);
        tracing::info!(url = %self.url, "Connecting to live stream");

        let (socket, _response) = match tokio_tungstenite::connect_async(self.url.as_str()).await {
            Ok(connected) => connected,
            Err(e) => {
                self.mark_disconnected();
                return Err(StreamError::Connect {
                    message: e.to_string(),
                });
            }
        };

        let (sink, source) = socket.split();
        *self.sink.lock().await = Some(sink);
        *self.source.lock().await = Some(source);
        self.set_state(ConnectionState::Connected);
        tracing::info!(url = %self.url, "Live stream connected");
        Ok(())
    }

    async fn write(&self, frames: &[String]) -> Result<(), StreamError> {
        if self.state() != ConnectionState::Connected {
            return Err(StreamError::NotConnected);
        }
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(StreamError::NotConnected)?;

        for frame in frames {
            if let Err(e) = sink.send(Message::text(frame.clone())).await {
                return Err(self.socket_error(&e));
            }
        }
        Ok(())
    }

    async fn read(&self) -> Result<DecodedMessage, StreamError> {
        let mut guard = self.source.lock().await;
        let source = guard.as_mut().ok_or(StreamError::NotConnected)?;

        loop {
            match source.next().await {
                Some(Ok(Message::Text(text))) => {
                    return decode_frame(text.as_str()).map_err(|e| {
                        metrics::record_decode_failure(failure_label(&e));
                        tracing::warn!(error = %e, "Failed to decode live frame");
                        self.mark_disconnected();
                        StreamError::Decode(e)
                    });
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!("Live stream closed by peer");
                    self.mark_disconnected();
                    return Err(StreamError::Closed);
                }
                // Ping, pong and binary frames carry no data.
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(self.socket_error(&e)),
            }
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    async fn close(&self) {
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        self.source.lock().await.take();
        self.mark_disconnected();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_disconnected() {
        let connection = VndStreamConnection::new("ws://127.0.0.1:1");
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(matches!(
            connection.write(&["1".to_string()]).await,
            Err(StreamError::NotConnected)
        ));
        assert!(matches!(connection.read().await, Err(StreamError::NotConnected)));
    }

    #[tokio::test]
    async fn connect_failure_stays_disconnected() {
        let connection = VndStreamConnection::new("ws://127.0.0.1:1");
        assert!(matches!(
            connection.connect().await,
            Err(StreamError::Connect { .. })
        ));
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn failure_labels() {
        assert_eq!(
            failure_label(&DecodeError::MalformedFrame(String::new())),
            "malformed_frame"
        );
    }
}
