//! Named broadcast groups of sessions.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::broadcast::{Payload, deliver};
use crate::engine::{ChannelTable, EngineShared};
use crate::session::SessionId;
use crate::{ChannelConfig, Error, Session};

/// A named set of sessions that can be written to at once.
///
/// Channels are created with
/// [`Engine::new_channel`](crate::Engine::new_channel) and joined with
/// [`Session::subscribe`]. A closed channel has no
/// members, is gone from the engine, and rejects every broadcast.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    name: String,
    config: ChannelConfig,
    members: Mutex<HashMap<SessionId, Session>>,
    closed: AtomicBool,
    engine: Weak<EngineShared>,
}

impl Channel {
    pub(crate) fn new(
        name: String,
        config: ChannelConfig,
        engine: Weak<EngineShared>,
    ) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                name,
                config,
                members: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
                engine,
            }),
        }
    }

    /// The channel's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The configuration the channel was created with.
    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// Returns `true` once the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Returns `true` if `session` is a member.
    pub fn contains(&self, session: &Session) -> bool {
        self.inner.members.lock().contains_key(&session.id())
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.inner.members.lock().len()
    }

    /// Returns `true` if the channel has no members.
    pub fn is_empty(&self) -> bool {
        self.inner.members.lock().is_empty()
    }

    /// A snapshot of the current members, in no particular order.
    pub fn members(&self) -> Vec<Session> {
        self.inner.members.lock().values().cloned().collect()
    }

    // --- Broadcasting ---

    /// Writes a text message to every member.
    ///
    /// # Errors
    /// [`Error::ChannelClosed`] on a closed channel. Per-member failures
    /// go to [`Handler::error`](crate::Handler::error) instead.
    pub async fn broadcast(&self, msg: impl Into<String>) -> Result<(), Error> {
        self.fan_out(Payload::Text(msg.into()), |_| true).await
    }

    /// Writes a text message to every member `filter` accepts.
    pub async fn broadcast_filter<F>(
        &self,
        msg: impl Into<String>,
        filter: F,
    ) -> Result<(), Error>
    where
        F: Fn(&Session) -> bool,
    {
        self.fan_out(Payload::Text(msg.into()), filter).await
    }

    /// Writes a text message to every member except `excluded`.
    pub async fn broadcast_others(
        &self,
        msg: impl Into<String>,
        excluded: &Session,
    ) -> Result<(), Error> {
        let excluded = excluded.id();
        self.fan_out(Payload::Text(msg.into()), |s| s.id() != excluded)
            .await
    }

    /// Writes a binary message to every member.
    pub async fn broadcast_binary(
        &self,
        msg: impl Into<Vec<u8>>,
    ) -> Result<(), Error> {
        self.fan_out(Payload::Binary(msg.into()), |_| true).await
    }

    /// Writes a binary message to every member `filter` accepts.
    pub async fn broadcast_binary_filter<F>(
        &self,
        msg: impl Into<Vec<u8>>,
        filter: F,
    ) -> Result<(), Error>
    where
        F: Fn(&Session) -> bool,
    {
        self.fan_out(Payload::Binary(msg.into()), filter).await
    }

    /// Writes a binary message to every member except `excluded`.
    pub async fn broadcast_binary_others(
        &self,
        msg: impl Into<Vec<u8>>,
        excluded: &Session,
    ) -> Result<(), Error> {
        let excluded = excluded.id();
        self.fan_out(Payload::Binary(msg.into()), |s| s.id() != excluded)
            .await
    }

    async fn fan_out<F>(&self, payload: Payload, filter: F) -> Result<(), Error>
    where
        F: Fn(&Session) -> bool,
    {
        if self.is_closed() {
            return Err(Error::ChannelClosed);
        }
        let targets: Vec<Session> =
            self.members().into_iter().filter(|s| filter(s)).collect();
        tracing::debug!(
            channel = %self.name(),
            recipients = targets.len(),
            "channel broadcast"
        );
        deliver(&targets, &payload).await;
        Ok(())
    }

    // --- Closing ---

    /// Closes the channel and evicts every member.
    ///
    /// # Errors
    /// [`Error::ChannelClosed`] if it was already closed.
    pub fn close(&self) -> Result<(), Error> {
        let engine = self.inner.engine.upgrade();
        let mut channels = engine.as_ref().map(|e| e.channels.lock());
        self.mark_closed(channels.as_deref_mut())?;
        self.evict_members();
        Ok(())
    }

    /// Writes a final text message to every member, then evicts them.
    pub async fn close_with_msg(
        &self,
        msg: impl Into<String>,
    ) -> Result<(), Error> {
        self.close_with(Payload::Text(msg.into())).await
    }

    /// Writes a final binary message to every member, then evicts them.
    pub async fn close_with_binary(
        &self,
        msg: impl Into<Vec<u8>>,
    ) -> Result<(), Error> {
        self.close_with(Payload::Binary(msg.into())).await
    }

    async fn close_with(&self, payload: Payload) -> Result<(), Error> {
        let members = {
            let engine = self.inner.engine.upgrade();
            let mut channels = engine.as_ref().map(|e| e.channels.lock());
            self.mark_closed(channels.as_deref_mut())?;
            self.members()
        };

        // Closed and out of the table: nobody can join while we write.
        deliver(&members, &payload).await;

        let engine = self.inner.engine.upgrade();
        let _channels = engine.as_ref().map(|e| e.channels.lock());
        self.evict_members();
        Ok(())
    }

    /// Flags the channel closed and drops it from `channels` if the table
    /// still points at it.
    pub(crate) fn mark_closed(
        &self,
        channels: Option<&mut ChannelTable>,
    ) -> Result<(), Error> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::ChannelClosed);
        }
        if let Some(channels) = channels {
            if channels.get(self.name()).is_some_and(|c| c.ptr_eq(self)) {
                channels.remove(self.name());
            }
        }
        tracing::debug!(channel = %self.name(), "channel closed");
        Ok(())
    }

    /// Removes every member, both from this channel and from the members'
    /// subscriptions. Caller holds the channel table lock.
    pub(crate) fn evict_members(&self) {
        let members = std::mem::take(&mut *self.inner.members.lock());
        for session in members.values() {
            session.forget_channel(self);
        }
    }

    /// Adds `session`; returns `false` if it was already a member.
    pub(crate) fn add_member(&self, session: &Session) -> bool {
        let mut members = self.inner.members.lock();
        if members.contains_key(&session.id()) {
            return false;
        }
        members.insert(session.id(), session.clone());
        true
    }

    pub(crate) fn remove_member(&self, id: SessionId) -> bool {
        self.inner.members.lock().remove(&id).is_some()
    }

    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name())
            .field("members", &self.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
