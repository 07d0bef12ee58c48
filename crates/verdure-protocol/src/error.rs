//! Error types for the protocol layer.
//!
//! Each crate in Verdure defines its own error enum. A `ProtocolError`
//! always means a raw number from the wire did not map onto the
//! vocabulary in this crate.

/// Errors that can occur while interpreting wire-level numbers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The opcode is not one of the five message kinds.
    #[error("unknown message type: {0}")]
    UnknownMessageType(u8),

    /// The close code lies outside every range RFC 6455 allows
    /// (below 1000, 1004, or 5000 and above).
    #[error("invalid close status: {0}")]
    InvalidCloseStatus(u16),
}
