//! Frames as the rest of Verdure sees them.
//!
//! tungstenite's `Message` carries reference-counted buffers and a raw
//! frame variant that never surfaces from a read. [`Frame`] is the owned,
//! closed set of five message kinds from [`MessageType`], so the engine
//! and the client can match on it exhaustively.

use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use verdure_protocol::{CloseStatus, MessageType};

/// Status and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// The close status code.
    pub status: CloseStatus,
    /// A human-readable reason, possibly empty.
    pub reason: String,
}

impl CloseReason {
    /// Creates a close reason.
    pub fn new(status: CloseStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }
}

/// One WebSocket message, data or control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text data frame.
    Text(String),
    /// A binary data frame.
    Binary(Vec<u8>),
    /// A ping control frame with its application payload.
    Ping(Vec<u8>),
    /// A pong control frame with its application payload.
    Pong(Vec<u8>),
    /// A close control frame. `None` means the frame had no status code.
    Close(Option<CloseReason>),
}

impl Frame {
    /// Returns the kind of this frame.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Text(_) => MessageType::Text,
            Self::Binary(_) => MessageType::Binary,
            Self::Ping(_) => MessageType::Ping,
            Self::Pong(_) => MessageType::Pong,
            Self::Close(_) => MessageType::Close,
        }
    }

    /// Splits the frame into its kind and raw payload bytes.
    ///
    /// A close payload is laid out as on the wire: the status code as a
    /// big-endian `u16` followed by the UTF-8 reason.
    pub fn into_parts(self) -> (MessageType, Vec<u8>) {
        let kind = self.message_type();
        let payload = match self {
            Self::Text(text) => text.into_bytes(),
            Self::Binary(data) | Self::Ping(data) | Self::Pong(data) => data,
            Self::Close(None) => Vec::new(),
            Self::Close(Some(close)) => {
                let mut payload = close.status.code().to_be_bytes().to_vec();
                payload.extend_from_slice(close.reason.as_bytes());
                payload
            }
        };
        (kind, payload)
    }

    /// Converts a received tungstenite message. Raw frames yield `None`.
    pub(crate) fn from_message(msg: Message) -> Option<Self> {
        let frame = match msg {
            Message::Text(text) => Self::Text(text.as_str().to_owned()),
            Message::Binary(data) => Self::Binary(data.to_vec()),
            Message::Ping(data) => Self::Ping(data.to_vec()),
            Message::Pong(data) => Self::Pong(data.to_vec()),
            Message::Close(close) => Self::Close(close.map(|frame| {
                // tungstenite rejects reserved codes before we get here.
                let status = CloseStatus::try_from(u16::from(frame.code))
                    .unwrap_or(CloseStatus::ProtocolError);
                CloseReason::new(status, frame.reason.as_str())
            })),
            Message::Frame(_) => return None,
        };
        Some(frame)
    }

    /// Converts into a tungstenite message for sending.
    pub(crate) fn into_message(self) -> Message {
        match self {
            Self::Text(text) => Message::text(text),
            Self::Binary(data) => Message::binary(data),
            Self::Ping(data) => Message::Ping(data.into()),
            Self::Pong(data) => Message::Pong(data.into()),
            Self::Close(close) => Message::Close(close.map(|close| {
                CloseFrame {
                    code: CloseCode::from(close.status.code()),
                    reason: close.reason.into(),
                }
            })),
        }
    }
}
