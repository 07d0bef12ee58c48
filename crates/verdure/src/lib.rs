//! # Verdure
//!
//! WebSocket sessions and broadcast channels for Tokio servers.
//!
//! Verdure sits on top of a plain WebSocket connection and adds the
//! pieces most realtime servers end up writing themselves:
//!
//! - a [`Session`] per connection, with an id, a typed scratch
//!   [`Store`], and serialised writes;
//! - named [`Channel`]s that sessions subscribe to and that can be
//!   broadcast to;
//! - an [`Engine`] that upgrades connections, pings idle peers, and calls
//!   back into your [`Handler`] for every event.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use verdure::prelude::*;
//!
//! struct Chat;
//!
//! #[async_trait]
//! impl Handler for Chat {
//!     async fn connect(&self, session: &Session) {
//!         let _ = session.subscribe("lobby");
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new(EngineConfig::default(), Chat);
//! let lobby = engine.new_channel("lobby", ChannelConfig::default());
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! tokio::spawn({
//!     let engine = engine.clone();
//!     async move { engine.serve(listener).await }
//! });
//!
//! lobby.broadcast("welcome").await?;
//! # Ok(())
//! # }
//! ```

mod broadcast;
mod channel;
mod config;
mod engine;
mod error;
mod handler;
mod session;

pub use channel::Channel;
pub use config::{ChannelConfig, EngineConfig};
pub use engine::Engine;
pub use error::Error;
pub use handler::Handler;
pub use session::{Session, SessionId};

pub use async_trait::async_trait;
pub use verdure_protocol::{CloseStatus, MessageType};
pub use verdure_store::{Store, Value};
pub use verdure_transport::UpgradeRequest;

/// Everything a typical server needs, in one import.
pub mod prelude {
    pub use crate::{
        Channel, ChannelConfig, CloseStatus, Engine, EngineConfig, Error,
        Handler, Session, SessionId, UpgradeRequest, Value, async_trait,
    };
}
