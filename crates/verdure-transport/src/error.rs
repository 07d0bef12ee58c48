use tokio_tungstenite::tungstenite;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed, locally or by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// A write did not finish before its deadline.
    #[error("write timed out")]
    WriteTimedOut,

    /// The opening handshake did not finish in time.
    #[error("handshake timed out")]
    HandshakeTimedOut,

    /// The opening handshake was rejected or malformed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(#[source] tungstenite::Error),

    /// An inbound message exceeded the configured size limit.
    #[error("message of {size} bytes exceeds the limit of {max_size} bytes")]
    MessageTooBig {
        /// Size of the offending message.
        size: usize,
        /// Configured limit.
        max_size: usize,
    },

    /// Sending a frame failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] tungstenite::Error),

    /// Receiving a frame failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] tungstenite::Error),

    /// Binding or accepting TCP connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),
}

impl TransportError {
    /// Maps a tungstenite error seen on the write path.
    pub(crate) fn from_send(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed => Self::ConnectionClosed,
            other => Self::SendFailed(other),
        }
    }

    /// Maps a tungstenite error seen on the read path.
    pub(crate) fn from_recv(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed => Self::ConnectionClosed,
            tungstenite::Error::Capacity(
                tungstenite::error::CapacityError::MessageTooLong {
                    size,
                    max_size,
                },
            ) => Self::MessageTooBig { size, max_size },
            other => Self::ReceiveFailed(other),
        }
    }

    /// Returns `true` if the error means the connection is gone.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}
