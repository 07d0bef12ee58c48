//! Best-effort fan-out shared by engine and channel broadcasts.

use futures_util::future::join_all;

use crate::{Error, Session};

/// One outbound data message.
#[derive(Debug, Clone)]
pub(crate) enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    pub(crate) async fn write_to(
        &self,
        session: &Session,
    ) -> Result<(), Error> {
        match self {
            Self::Text(msg) => session.write(msg.as_str()).await,
            Self::Binary(msg) => session.write_binary(msg.as_slice()).await,
        }
    }
}

/// Writes `payload` to every target concurrently.
///
/// A failed write is logged and reported to that session's
/// [`Handler::error`](crate::Handler::error); it never stops delivery to
/// the others.
pub(crate) async fn deliver(targets: &[Session], payload: &Payload) {
    join_all(targets.iter().map(|session| async move {
        if let Err(err) = payload.write_to(session).await {
            tracing::warn!(
                session_id = session.id(),
                error = %err,
                "broadcast delivery failed"
            );
            session.handler().error(session, &err).await;
        }
    }))
    .await;
}
