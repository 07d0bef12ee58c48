//! Transport adapter for Verdure.
//!
//! Provides the [`Connection`] trait, the minimum the engine and the
//! client need from a WebSocket implementation, and
//! [`WebSocketConnection`], its implementation on top of
//! `tokio-tungstenite`.
//!
//! Frame parsing, masking, and the opening handshake are tungstenite's
//! job. This crate adds what tungstenite leaves to its callers: write
//! deadlines, a write lock so that concurrent writers cannot interleave
//! frames, and a way to stop a blocked reader.

#![allow(async_fn_in_trait)]

mod config;
mod error;
mod frame;
mod websocket;

pub use config::TransportConfig;
pub use error::TransportError;
pub use frame::{CloseReason, Frame};
pub use websocket::WebSocketConnection;

pub use tokio_tungstenite::tungstenite::handshake::client::Response as
    UpgradeResponse;
pub use tokio_tungstenite::tungstenite::handshake::server::Request as
    UpgradeRequest;
pub use tokio_tungstenite::tungstenite::http;

use tokio::time::Instant;
use verdure_protocol::CloseStatus;

/// A single bidirectional message connection.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Receives the next frame from the remote peer.
    ///
    /// Control frames are returned too. Returns `Ok(None)` once the peer
    /// has finished the closing handshake and the stream has ended.
    async fn recv(&self) -> Result<Option<Frame>, Self::Error>;

    /// Sends one frame, failing if it is not written by `deadline`.
    async fn send(
        &self,
        frame: Frame,
        deadline: Instant,
    ) -> Result<(), Self::Error>;

    /// Sends a close frame and releases the connection.
    ///
    /// Any task blocked in [`recv`](Self::recv) wakes up with an error.
    /// A second call fails.
    async fn close(
        &self,
        status: CloseStatus,
        reason: &str,
        deadline: Instant,
    ) -> Result<(), Self::Error>;

    /// Returns `true` once the connection has been closed locally.
    fn is_closed(&self) -> bool;
}
