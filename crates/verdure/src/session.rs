//! One connected peer as seen by the server.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;
use verdure_protocol::CloseStatus;
use verdure_store::{Store, Value};
use verdure_transport::{Connection, Frame, WebSocketConnection};

use crate::engine::EngineShared;
use crate::{Channel, Error, Handler};

/// A numeric session identity, unique within one engine.
pub type SessionId = u64;

/// The server side of one WebSocket connection.
///
/// A `Session` is a cheap handle: clones refer to the same connection.
/// Sessions are created by the engine when a connection is upgraded and
/// handed to every [`Handler`] callback. Once closed, a session stays
/// closed; it has left every channel and the engine's session table.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: SessionId,
    engine: Arc<EngineShared>,
    /// `None` when the upgrade failed.
    conn: Option<WebSocketConnection>,
    store: Store,
    subscriptions: Mutex<HashMap<String, Channel>>,
    closed: AtomicBool,
}

/// Forwards typed reads to the session store.
macro_rules! store_readers {
    ($($name:ident -> $ty:ty),* $(,)?) => {
        $(
            #[doc = concat!(
                "Shorthand for [`Store::", stringify!($name), "`]."
            )]
            pub fn $name(&self, key: &str) -> $ty {
                self.inner.store.$name(key)
            }
        )*
    };
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        engine: Arc<EngineShared>,
        conn: Option<WebSocketConnection>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                engine,
                conn,
                store: Store::new(),
                subscriptions: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// The session's identity. Ids start at 1 and only grow.
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Returns `true` once the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn handler(&self) -> &dyn Handler {
        self.inner.engine.handler.as_ref()
    }

    pub(crate) fn connection(&self) -> Option<&WebSocketConnection> {
        self.inner.conn.as_ref()
    }

    // --- Writing ---

    /// Sends a text message, then runs
    /// [`Handler::sent_message`](crate::Handler::sent_message).
    ///
    /// # Errors
    /// [`Error::SessionClosed`] on a closed session; transport failures
    /// otherwise.
    pub async fn write(&self, msg: impl Into<String>) -> Result<(), Error> {
        let msg = msg.into();
        self.send(Frame::Text(msg.clone())).await?;
        self.handler().sent_message(self, &msg).await;
        Ok(())
    }

    /// Sends a binary message, then runs
    /// [`Handler::sent_message_binary`](crate::Handler::sent_message_binary).
    pub async fn write_binary(
        &self,
        msg: impl Into<Vec<u8>>,
    ) -> Result<(), Error> {
        let msg = msg.into();
        self.send(Frame::Binary(msg.clone())).await?;
        self.handler().sent_message_binary(self, &msg).await;
        Ok(())
    }

    /// Sends a ping control frame.
    pub async fn ping(&self) -> Result<(), Error> {
        self.send(Frame::Ping(Vec::new())).await
    }

    /// Sends a pong control frame.
    pub async fn pong(&self) -> Result<(), Error> {
        self.send(Frame::Pong(Vec::new())).await
    }

    async fn send(&self, frame: Frame) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        let conn = self.connection().ok_or(Error::ConnectionClosed)?;
        conn.send(frame, self.deadline()).await?;
        Ok(())
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.inner.engine.config.write_wait
    }

    // --- Scratch store ---

    /// The session's scratch store.
    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// Returns a copy of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.store.get(key)
    }

    /// Returns the value stored under `key`, or [`Error::KeyNotFound`].
    pub fn must_get(&self, key: &str) -> Result<Value, Error> {
        Ok(self.inner.store.must_get(key)?)
    }

    /// Stores `value` under `key`.
    ///
    /// # Errors
    /// [`Error::SessionClosed`] on a closed session.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        self.inner.store.set(key, value);
        Ok(())
    }

    /// Removes the value stored under `key`.
    ///
    /// # Errors
    /// [`Error::SessionClosed`] on a closed session,
    /// [`Error::KeyNotFound`] if nothing is stored there.
    pub fn delete(&self, key: &str) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        Ok(self.inner.store.delete(key)?)
    }

    store_readers!(
        get_string -> String,
        get_bool -> bool,
        get_int -> isize,
        get_int64 -> i64,
        get_float64 -> f64,
        get_duration -> Duration,
        get_time -> DateTime<Utc>,
        get_string_map -> HashMap<String, Value>,
        get_string_map_string -> HashMap<String, String>,
        get_string_slice -> Vec<String>,
    );

    // --- Channels ---
    //
    // Every membership change holds the engine's channel table lock, so a
    // channel's member map and a session's subscription map always change
    // together.

    /// Joins the channel called `name`.
    ///
    /// # Errors
    /// [`Error::ChannelNotFound`] if no open channel has that name,
    /// [`Error::ChannelSubscribed`] if the session already joined it,
    /// [`Error::SessionClosed`] on a closed session.
    pub fn subscribe(&self, name: &str) -> Result<(), Error> {
        let channels = self.inner.engine.channels.lock();
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        let channel = channels
            .get(name)
            .ok_or_else(|| Error::ChannelNotFound(name.to_owned()))?;
        if !channel.add_member(self) {
            return Err(Error::ChannelSubscribed(name.to_owned()));
        }
        self.inner
            .subscriptions
            .lock()
            .insert(name.to_owned(), channel.clone());

        tracing::debug!(session_id = self.id(), channel = name, "subscribed");
        Ok(())
    }

    /// Leaves the channel called `name`.
    ///
    /// # Errors
    /// [`Error::ChannelNotSubscribed`] if the session is not a member,
    /// [`Error::ChannelNotFound`] if it is not a member and no channel has
    /// that name, [`Error::SessionClosed`] on a closed session.
    pub fn unsubscribe(&self, name: &str) -> Result<(), Error> {
        let channels = self.inner.engine.channels.lock();
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        let Some(channel) = self.inner.subscriptions.lock().remove(name) else {
            return Err(if channels.contains_key(name) {
                Error::ChannelNotSubscribed(name.to_owned())
            } else {
                Error::ChannelNotFound(name.to_owned())
            });
        };
        channel.remove_member(self.id());

        tracing::debug!(session_id = self.id(), channel = name, "unsubscribed");
        Ok(())
    }

    /// Leaves every channel.
    pub fn unsubscribe_all(&self) {
        let _channels = self.inner.engine.channels.lock();
        let subscriptions =
            std::mem::take(&mut *self.inner.subscriptions.lock());
        for channel in subscriptions.into_values() {
            channel.remove_member(self.id());
        }
    }

    /// Returns `true` if the session is a member of the channel `name`.
    pub fn is_subscribed(&self, name: &str) -> bool {
        self.inner.subscriptions.lock().contains_key(name)
    }

    /// Names of the channels the session is a member of.
    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.subscriptions.lock().keys().cloned().collect()
    }

    /// Drops the subscription entry for `channel`, leaving an entry for a
    /// newer channel of the same name alone. Caller holds the channel
    /// table lock.
    pub(crate) fn forget_channel(&self, channel: &Channel) {
        let mut subscriptions = self.inner.subscriptions.lock();
        if subscriptions
            .get(channel.name())
            .is_some_and(|c| c.ptr_eq(channel))
        {
            subscriptions.remove(channel.name());
        }
    }

    // --- Closing ---

    /// Closes the session with status 1000.
    ///
    /// # Errors
    /// [`Error::SessionClosed`] if it was already closed.
    pub async fn close(&self) -> Result<(), Error> {
        self.close_with_status(CloseStatus::NormalClosure, "").await
    }

    /// Sends a final text message, then closes the session.
    pub async fn close_with_msg(
        &self,
        msg: impl Into<String>,
    ) -> Result<(), Error> {
        self.write(msg).await?;
        self.close().await
    }

    /// Sends a final binary message, then closes the session.
    pub async fn close_with_binary(
        &self,
        msg: impl Into<Vec<u8>>,
    ) -> Result<(), Error> {
        self.write_binary(msg).await?;
        self.close().await
    }

    /// Closes the session, sending `status` to the peer.
    ///
    /// The session leaves the engine table and every channel before the
    /// close frame is written. Only the first call does anything.
    pub(crate) async fn close_with_status(
        &self,
        status: CloseStatus,
        reason: &str,
    ) -> Result<(), Error> {
        {
            let mut sessions = self.inner.engine.sessions.lock();
            if self.inner.closed.swap(true, Ordering::SeqCst) {
                return Err(Error::SessionClosed);
            }
            sessions.remove(self.id());
        }
        self.unsubscribe_all();

        if let Some(conn) = self.connection() {
            let result = conn.close(status, reason, self.deadline()).await;
            if let Err(err) = result {
                tracing::debug!(
                    session_id = self.id(),
                    error = %err,
                    "transport already closed"
                );
            }
        }

        tracing::debug!(session_id = self.id(), %status, "session closed");
        Ok(())
    }

    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Session {}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("closed", &self.is_closed())
            .field("subscriptions", &self.subscriptions())
            .finish_non_exhaustive()
    }
}
