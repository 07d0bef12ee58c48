//! Engine and channel configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use verdure_transport::TransportConfig;

/// Settings for an [`Engine`](crate::Engine).
///
/// All durations are wall-clock durations. The defaults are:
///
/// | field               | default  |
/// |---------------------|----------|
/// | `write_wait`        | 30 s     |
/// | `pong_wait`         | 10 s     |
/// | `ping_period`       | 20 s     |
/// | `max_message_size`  | 10 MiB   |
/// | `handshake_timeout` | 30 s     |
/// | `read_buffer_size`  | 1 KiB    |
/// | `write_buffer_size` | 1 KiB    |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deadline applied to every outbound frame, data or control.
    pub write_wait: Duration,

    /// How long a peer may leave a ping unanswered before the session is
    /// closed. Zero disables pings entirely.
    pub pong_wait: Duration,

    /// Interval between outbound pings.
    pub ping_period: Duration,

    /// Largest inbound message, in bytes. Larger messages close the
    /// connection with status 1009. Zero disables the limit.
    pub max_message_size: usize,

    /// Maximum time allowed for the opening handshake.
    pub handshake_timeout: Duration,

    /// Initial read buffer size, in bytes.
    pub read_buffer_size: usize,

    /// Write buffer size, in bytes.
    pub write_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            write_wait: Duration::from_secs(30),
            pong_wait: Duration::from_secs(10),
            ping_period: Duration::from_secs(20),
            max_message_size: 10 * 1024 * 1024,
            handshake_timeout: Duration::from_secs(30),
            read_buffer_size: 1024,
            write_buffer_size: 1024,
        }
    }
}

impl EngineConfig {
    /// The transport settings used for every upgrade.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            handshake_timeout: self.handshake_timeout,
            read_buffer_size: self.read_buffer_size,
            write_buffer_size: self.write_buffer_size,
            max_message_size: (self.max_message_size > 0)
                .then_some(self.max_message_size),
        }
    }

    /// Returns `true` if sessions are pinged and dropped when silent.
    pub fn liveness_enabled(&self) -> bool {
        !self.pong_wait.is_zero() && !self.ping_period.is_zero()
    }
}

/// Settings for a [`Channel`](crate::Channel). Currently empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {}
