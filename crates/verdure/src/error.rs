//! Unified error type for the Verdure engine.

use verdure_store::StoreError;
use verdure_transport::TransportError;

/// Errors returned by engine, session, and channel operations.
///
/// The unit variants are stable identities callers can match on. Any
/// transport failure without a dedicated variant is wrapped in
/// [`Error::Transport`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The engine has been closed and accepts no more work.
    #[error("engine closed")]
    EngineClosed,

    /// The channel has been closed.
    #[error("channel closed")]
    ChannelClosed,

    /// The opening handshake did not finish in time.
    #[error("session timed out")]
    SessionTimedOut,

    /// The underlying connection is gone.
    #[error("connection closed")]
    ConnectionClosed,

    /// The session has been closed.
    #[error("session closed")]
    SessionClosed,

    /// No channel with this name exists.
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    /// The session is already a member of this channel.
    #[error("already subscribed to channel: {0}")]
    ChannelSubscribed(String),

    /// The session is not a member of this channel.
    #[error("not subscribed to channel: {0}")]
    ChannelNotSubscribed(String),

    /// Nothing is stored under this key.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// A write missed its deadline, or the peer stopped answering pings.
    #[error("write timed out")]
    WriteTimedOut,

    /// Any other transport failure.
    #[error(transparent)]
    Transport(TransportError),
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ConnectionClosed => Self::ConnectionClosed,
            TransportError::WriteTimedOut => Self::WriteTimedOut,
            TransportError::HandshakeTimedOut => Self::SessionTimedOut,
            other => Self::Transport(other),
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::KeyNotFound(key) => Self::KeyNotFound(key),
        }
    }
}

impl Error {
    /// Returns `true` if the peer sent a message over the size limit.
    pub fn is_message_too_big(&self) -> bool {
        matches!(self, Self::Transport(TransportError::MessageTooBig { .. }))
    }
}
