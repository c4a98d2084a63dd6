//! Stream Connection Port (Driven Port)
//!
//! A long-lived live feed connection. Implementations own their connection
//! state and socket; `connect` is a no-op while already connected, and any
//! read, write or decode failure moves the connection to `Disconnected`.

use std::fmt;

use async_trait::async_trait;

use crate::domain::{DecodeError, DecodedMessage};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No usable socket.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Socket open; reads and writes allowed.
    Connected,
}

impl ConnectionState {
    /// State name for logs and health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live stream error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    /// Opening the connection failed.
    #[error("stream connect failed: {message}")]
    Connect {
        /// Error details.
        message: String,
    },

    /// Socket-level read or write failure.
    #[error("stream socket error: {message}")]
    Socket {
        /// Error details.
        message: String,
    },

    /// Peer closed the connection.
    #[error("stream closed by peer")]
    Closed,

    /// Operation attempted without a connection.
    #[error("stream not connected")]
    NotConnected,

    /// A frame could not be decoded.
    #[error("stream decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Port for the live feed connection.
#[async_trait]
pub trait StreamConnection: Send + Sync {
    /// Open the connection. No-op when already connected.
    async fn connect(&self) -> Result<(), StreamError>;

    /// Send control frames in order.
    async fn write(&self, frames: &[String]) -> Result<(), StreamError>;

    /// Receive and decode the next data frame.
    async fn read(&self) -> Result<DecodedMessage, StreamError>;

    /// Current state.
    fn state(&self) -> ConnectionState;

    /// Close the socket and mark the connection disconnected.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
    }

    #[test]
    fn decode_errors_convert() {
        let err: StreamError = DecodeError::MalformedFrame("x".to_string()).into();
        assert!(matches!(err, StreamError::Decode(_)));
    }
}
