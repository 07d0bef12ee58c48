//! The WebSocket vocabulary shared by the engine and the client.
//!
//! Two enums live here: [`MessageType`], the kind of a frame as it is
//! numbered on the wire, and [`CloseStatus`], the status code carried by
//! a close frame. Neither knows anything about connections; the transport
//! layer converts tungstenite messages into these types and back.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// The kind of a WebSocket message, numbered by its RFC 6455 opcode.
///
/// Only [`Text`](Self::Text) and [`Binary`](Self::Binary) carry
/// application data. The other three are control frames: the engine
/// handles them itself and only reports them through handler callbacks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum MessageType {
    /// UTF-8 text data.
    Text = 1,
    /// Arbitrary binary data.
    Binary = 2,
    /// Close control frame. The payload holds a status code and reason.
    Close = 8,
    /// Ping control frame.
    Ping = 9,
    /// Pong control frame.
    Pong = 10,
}

impl MessageType {
    /// Returns the opcode for this message type.
    pub fn opcode(self) -> u8 {
        self as u8
    }

    /// Returns `true` for close, ping, and pong.
    pub fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }

    /// Returns `true` for text and binary.
    pub fn is_data(self) -> bool {
        !self.is_control()
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(opcode: u8) -> Result<Self, Self::Error> {
        match opcode {
            1 => Ok(Self::Text),
            2 => Ok(Self::Binary),
            8 => Ok(Self::Close),
            9 => Ok(Self::Ping),
            10 => Ok(Self::Pong),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(kind: MessageType) -> Self {
        kind.opcode()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Close => "close",
            Self::Ping => "ping",
            Self::Pong => "pong",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// CloseStatus
// ---------------------------------------------------------------------------

/// The status code carried by a close frame.
///
/// The named variants are the codes registered in RFC 6455 §7.4.1.
/// Anything else a peer may legally send (1014, the 1016–2999 range
/// reserved for future extensions, and the 3000–4999 range for libraries
/// and applications) is kept as [`Other`](Self::Other) so that the
/// `close` callback always sees the exact number that arrived.
///
/// `NoStatusReceived`, `AbnormalClosure`, and `TlsHandshake` are never
/// put on the wire. They are reported locally when a close frame had no
/// status, when the connection dropped without a close frame, and when
/// the TLS handshake failed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u16", into = "u16")]
pub enum CloseStatus {
    /// 1000: the purpose of the connection was fulfilled.
    NormalClosure,
    /// 1001: the endpoint is going away (server shutdown, page unload).
    GoingAway,
    /// 1002: the peer violated the protocol.
    ProtocolError,
    /// 1003: the endpoint received a data type it cannot accept.
    UnsupportedData,
    /// 1005: a close frame arrived without a status code.
    NoStatusReceived,
    /// 1006: the connection dropped without a close frame.
    AbnormalClosure,
    /// 1007: a message payload was inconsistent with its type.
    InvalidFramePayloadData,
    /// 1008: a message violated the endpoint's policy.
    PolicyViolation,
    /// 1009: a message was too big to process.
    MessageTooBig,
    /// 1010: the client expected an extension the server did not offer.
    MandatoryExtension,
    /// 1011: the server hit an unexpected condition.
    InternalServerErr,
    /// 1012: the server is restarting.
    ServiceRestart,
    /// 1013: the server is overloaded; try again later.
    TryAgainLater,
    /// 1015: the TLS handshake failed.
    TlsHandshake,
    /// Any other valid code, kept verbatim.
    Other(u16),
}

impl CloseStatus {
    /// Returns the numeric close code.
    pub fn code(self) -> u16 {
        match self {
            Self::NormalClosure => 1000,
            Self::GoingAway => 1001,
            Self::ProtocolError => 1002,
            Self::UnsupportedData => 1003,
            Self::NoStatusReceived => 1005,
            Self::AbnormalClosure => 1006,
            Self::InvalidFramePayloadData => 1007,
            Self::PolicyViolation => 1008,
            Self::MessageTooBig => 1009,
            Self::MandatoryExtension => 1010,
            Self::InternalServerErr => 1011,
            Self::ServiceRestart => 1012,
            Self::TryAgainLater => 1013,
            Self::TlsHandshake => 1015,
            Self::Other(code) => code,
        }
    }

    /// Returns `true` for the 1000 status that marks a clean, intentional
    /// disconnect.
    pub fn is_normal(self) -> bool {
        matches!(self, Self::NormalClosure)
    }
}

impl TryFrom<u16> for CloseStatus {
    type Error = ProtocolError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        let status = match code {
            1000 => Self::NormalClosure,
            1001 => Self::GoingAway,
            1002 => Self::ProtocolError,
            1003 => Self::UnsupportedData,
            1005 => Self::NoStatusReceived,
            1006 => Self::AbnormalClosure,
            1007 => Self::InvalidFramePayloadData,
            1008 => Self::PolicyViolation,
            1009 => Self::MessageTooBig,
            1010 => Self::MandatoryExtension,
            1011 => Self::InternalServerErr,
            1012 => Self::ServiceRestart,
            1013 => Self::TryAgainLater,
            1015 => Self::TlsHandshake,
            1004 | 0..=999 | 5000.. => {
                return Err(ProtocolError::InvalidCloseStatus(code));
            }
            other => Self::Other(other),
        };
        Ok(status)
    }
}

impl From<CloseStatus> for u16 {
    fn from(status: CloseStatus) -> Self {
        status.code()
    }
}

impl fmt::Display for CloseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
