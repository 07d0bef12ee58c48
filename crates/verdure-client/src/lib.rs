//! WebSocket client for Verdure.
//!
//! The client speaks plain RFC 6455, so it can talk to any WebSocket
//! server. It exists so that Verdure servers can be tested end to end
//! and so that two servers can be bridged.
//!
//! ```rust,no_run
//! use verdure_client::{Client, ClientConfig};
//!
//! # async fn run() -> Result<(), verdure_client::ClientError> {
//! let (client, _response) =
//!     Client::connect(ClientConfig::new("ws://127.0.0.1:8080")).await?;
//! client.write("hi").await?;
//! let reply = client.read().await?;
//! client.disconnect().await?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;

pub use client::{Client, ClientConfig, DEFAULT_WRITE_WAIT};
pub use error::ClientError;
