//! Knobs passed through to the WebSocket implementation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

/// Upgrade and buffering settings for one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Maximum time allowed for the opening handshake.
    pub handshake_timeout: Duration,

    /// Initial size of the read buffer, in bytes.
    pub read_buffer_size: usize,

    /// Outgoing data is buffered until it reaches this size, in bytes.
    pub write_buffer_size: usize,

    /// Largest inbound message accepted, in bytes. `None` disables the
    /// limit.
    pub max_message_size: Option<usize>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(30),
            read_buffer_size: 1024,
            write_buffer_size: 1024,
            max_message_size: Some(10 * 1024 * 1024),
        }
    }
}

impl TransportConfig {
    /// Builds the tungstenite configuration for this transport.
    ///
    /// The frame limit follows the message limit: a single frame can
    /// never be larger than the message it belongs to.
    pub fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig::default()
            .read_buffer_size(self.read_buffer_size)
            .write_buffer_size(self.write_buffer_size)
            .max_message_size(self.max_message_size)
            .max_frame_size(self.max_message_size)
    }
}
