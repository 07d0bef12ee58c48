use tokio_tungstenite::tungstenite;
use verdure_transport::TransportError;

/// Errors returned by [`Client`](crate::Client) operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The client was closed or disconnected, or the server went away.
    #[error("connection closed")]
    ConnectionClosed,

    /// The address or headers could not form an upgrade request.
    #[error("invalid upgrade request: {0}")]
    InvalidRequest(#[source] tungstenite::Error),

    /// Any other transport failure.
    #[error(transparent)]
    Transport(TransportError),
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ConnectionClosed => Self::ConnectionClosed,
            other => Self::Transport(other),
        }
    }
}
