//! Upstream Broker Adapters
//!
//! REST crawler and live WebSocket feed for the upstream broker, plus the
//! frame cipher and field schemas both share.

pub mod cipher;
pub mod codec;
mod connection;
mod rest;
pub mod schema;

pub use codec::{decode_frame, decode_payload, decode_snapshot, encode_frame};
pub use connection::{DEFAULT_STREAM_URL, VndStreamConnection};
pub use rest::{VndEndpoints, VndRestCrawler};
