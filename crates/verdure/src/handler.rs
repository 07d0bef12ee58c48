//! The application callback surface.

use async_trait::async_trait;
use verdure_protocol::CloseStatus;
use verdure_transport::UpgradeRequest;

use crate::{Error, Session};

/// Callbacks invoked by the engine for every session event.
///
/// Every method has an empty default, so an application implements only
/// the events it cares about.
///
/// Callbacks triggered by inbound traffic run on the session's read loop,
/// one at a time and in arrival order; a slow callback delays the next
/// frame of that session and nothing else. `sent_message` and
/// `sent_message_binary` run on whichever task performed the write.
///
/// Callbacks may write to any session, including the one they were
/// called for. No engine lock is held while a callback runs.
///
/// ```rust,no_run
/// use verdure::prelude::*;
///
/// struct Echo;
///
/// #[async_trait]
/// impl Handler for Echo {
///     async fn message(&self, session: &Session, msg: String) {
///         let _ = session.write(msg).await;
///     }
/// }
/// ```
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// The upgrade finished and the read loop is about to start.
    async fn connect(&self, _session: &Session) {}

    /// The peer closed the connection with status 1000.
    async fn disconnect(&self, _session: &Session) {}

    /// The peer sent a close frame. Runs before
    /// [`disconnect`](Self::disconnect).
    async fn close(
        &self,
        _session: &Session,
        _status: CloseStatus,
        _reason: &str,
    ) {
    }

    /// A transport error ended the session, or a broadcast could not reach
    /// it. When the session was ended it is already closed.
    async fn error(&self, _session: &Session, _err: &Error) {}

    /// A text message arrived.
    async fn message(&self, _session: &Session, _msg: String) {}

    /// A binary message arrived.
    async fn message_binary(&self, _session: &Session, _msg: Vec<u8>) {}

    /// A text message was written to the session.
    async fn sent_message(&self, _session: &Session, _msg: &str) {}

    /// A binary message was written to the session.
    async fn sent_message_binary(&self, _session: &Session, _msg: &[u8]) {}

    /// The peer sent a ping. The pong is sent automatically.
    async fn ping(&self, _session: &Session) {}

    /// The peer answered a ping.
    async fn pong(&self, _session: &Session) {}

    /// The upgrade request, for inspecting headers or the path. Runs
    /// before [`connect`](Self::connect).
    async fn request(&self, _session: &Session, _request: &UpgradeRequest) {}
}
