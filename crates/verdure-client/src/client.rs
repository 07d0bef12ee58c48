//! The client connection and its configuration.

use std::time::Duration;

use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use verdure_protocol::{CloseStatus, MessageType};
use verdure_transport::http::HeaderMap;
use verdure_transport::{
    Connection, Frame, TransportConfig, UpgradeResponse, WebSocketConnection,
};

use crate::ClientError;

/// Write deadline used when [`ClientConfig::write_wait`] is zero.
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(30);

/// Configuration for [`Client::connect`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Server URL, e.g. `ws://127.0.0.1:8080/echo`.
    pub address: String,

    /// HTTP headers sent with the upgrade request.
    pub header: HeaderMap,

    /// Deadline for each write. Zero means [`DEFAULT_WRITE_WAIT`].
    pub write_wait: Duration,

    /// Handshake and buffer settings.
    pub transport: TransportConfig,
}

impl ClientConfig {
    /// Creates a config for `address` with every other field defaulted.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }
}

/// A WebSocket client connection.
///
/// Reads are meant to be driven by one task at a time; writes may come
/// from any number of tasks and are serialised.
#[derive(Debug)]
pub struct Client {
    conn: WebSocketConnection,
    write_wait: Duration,
}

impl Client {
    /// Connects to `config.address` and performs the opening handshake.
    ///
    /// Returns the client together with the server's upgrade response.
    pub async fn connect(
        config: ClientConfig,
    ) -> Result<(Self, UpgradeResponse), ClientError> {
        let write_wait = if config.write_wait.is_zero() {
            DEFAULT_WRITE_WAIT
        } else {
            config.write_wait
        };

        let mut request = config
            .address
            .as_str()
            .into_client_request()
            .map_err(ClientError::InvalidRequest)?;
        request.headers_mut().extend(config.header);

        let (conn, response) =
            WebSocketConnection::connect(request, &config.transport).await?;
        tracing::debug!(address = %config.address, "client connected");

        Ok((Self { conn, write_wait }, response))
    }

    /// Blocks until the next text message arrives, skipping every other
    /// kind of frame.
    pub async fn read(&self) -> Result<String, ClientError> {
        loop {
            if let Frame::Text(text) = self.next_frame().await? {
                return Ok(text);
            }
        }
    }

    /// Blocks until the next binary message arrives, skipping every other
    /// kind of frame.
    pub async fn read_binary(&self) -> Result<Vec<u8>, ClientError> {
        loop {
            if let Frame::Binary(data) = self.next_frame().await? {
                return Ok(data);
            }
        }
    }

    /// Blocks until the next frame of any kind arrives, control frames
    /// included.
    pub async fn read_all(
        &self,
    ) -> Result<(MessageType, Vec<u8>), ClientError> {
        Ok(self.next_frame().await?.into_parts())
    }

    /// Sends a text message.
    pub async fn write(
        &self,
        msg: impl Into<String>,
    ) -> Result<(), ClientError> {
        self.send(Frame::Text(msg.into())).await
    }

    /// Sends a binary message.
    pub async fn write_binary(
        &self,
        msg: impl Into<Vec<u8>>,
    ) -> Result<(), ClientError> {
        self.send(Frame::Binary(msg.into())).await
    }

    /// Sends a ping. The server answers with a pong.
    pub async fn ping(&self) -> Result<(), ClientError> {
        self.send(Frame::Ping(Vec::new())).await
    }

    /// Sends an unsolicited pong.
    pub async fn pong(&self) -> Result<(), ClientError> {
        self.send(Frame::Pong(Vec::new())).await
    }

    /// Tells the server the client is leaving (close status 1000) and
    /// closes the connection.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.disconnect_with_msg("").await
    }

    /// Like [`disconnect`](Self::disconnect), with a reason attached to
    /// the close frame.
    pub async fn disconnect_with_msg(
        &self,
        reason: &str,
    ) -> Result<(), ClientError> {
        self.conn
            .close(CloseStatus::NormalClosure, reason, self.deadline())
            .await?;
        Ok(())
    }

    /// Drops the connection without a close frame.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.conn.abort().await?;
        Ok(())
    }

    /// Returns `true` once the client has been closed or disconnected.
    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }

    async fn next_frame(&self) -> Result<Frame, ClientError> {
        if self.is_closed() {
            return Err(ClientError::ConnectionClosed);
        }
        self.conn.recv().await?.ok_or(ClientError::ConnectionClosed)
    }

    async fn send(&self, frame: Frame) -> Result<(), ClientError> {
        self.conn.send(frame, self.deadline()).await?;
        Ok(())
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.write_wait
    }
}
