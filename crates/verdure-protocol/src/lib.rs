//! Wire vocabulary for Verdure.
//!
//! This crate defines the numbers both ends of a connection agree on:
//!
//! - **Message kinds** ([`MessageType`]): text, binary, and the three
//!   control frames, numbered by opcode.
//! - **Close codes** ([`CloseStatus`]): the status carried by a close
//!   frame.
//! - **Errors** ([`ProtocolError`]): what can go wrong when a raw number
//!   does not fit the vocabulary.
//!
//! # Architecture
//!
//! ```text
//! Transport (tungstenite frames)
//!   → Protocol (MessageType, CloseStatus)
//!   → Engine / Client
//! ```

mod error;
mod types;

pub use error::ProtocolError;
pub use types::{CloseStatus, MessageType};
