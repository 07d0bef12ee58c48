//! The engine: upgrades connections, runs read loops, and owns the
//! session and channel tables.
//!
//! Each upgraded connection gets its own task. The flow is:
//!   1. Upgrade and allocate a session
//!   2. Run the `request` then `connect` callbacks
//!   3. Loop: receive frames → dispatch callbacks, ping the peer, and
//!      drop it if it stops answering
//!   4. Close the session on every exit path

use std::collections::HashMap;
use std::fmt;
use std::future::pending;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use verdure_protocol::CloseStatus;
use verdure_transport::{
    CloseReason, Connection, Frame, TransportError, UpgradeRequest,
    WebSocketConnection,
};

use crate::broadcast::{Payload, deliver};
use crate::session::SessionId;
use crate::{Channel, ChannelConfig, EngineConfig, Error, Handler, Session};

pub(crate) type ChannelTable = HashMap<String, Channel>;

/// The open sessions and the id counter, guarded together so that id
/// assignment and insertion are one step.
#[derive(Default)]
pub(crate) struct SessionTable {
    last_id: SessionId,
    open: HashMap<SessionId, Session>,
}

impl SessionTable {
    pub(crate) fn remove(&mut self, id: SessionId) -> Option<Session> {
        self.open.remove(&id)
    }
}

/// State shared by the engine and every session and channel it owns.
pub(crate) struct EngineShared {
    pub(crate) config: EngineConfig,
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) sessions: Mutex<SessionTable>,
    pub(crate) channels: Mutex<ChannelTable>,
    /// Only set while holding `sessions`.
    closed: AtomicBool,
    shutdown: CancellationToken,
}

/// A WebSocket server engine.
///
/// `Engine` is a cheap handle; clone it into every task that needs it.
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
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = Engine::new(EngineConfig::default(), Echo);
/// let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
/// engine.serve(listener).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Engine {
    shared: Arc<EngineShared>,
}

/// What woke the read loop.
enum Event {
    Frame(Result<Option<Frame>, TransportError>),
    PingDue,
    Unresponsive,
}

impl Engine {
    /// Creates an engine with empty session and channel tables.
    pub fn new(config: EngineConfig, handler: impl Handler) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                config,
                handler: Arc::new(handler),
                sessions: Mutex::new(SessionTable::default()),
                channels: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.shared.sessions.lock().open.len()
    }

    /// Returns `true` if no session is open.
    pub fn is_empty(&self) -> bool {
        self.shared.sessions.lock().open.is_empty()
    }

    /// Returns `true` once the engine has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// A snapshot of the open sessions, in no particular order.
    pub fn sessions(&self) -> Vec<Session> {
        self.shared.sessions.lock().open.values().cloned().collect()
    }

    // --- Channels ---

    /// Creates a channel called `name`.
    ///
    /// If a channel with that name already exists it is closed first and
    /// its members are evicted; they have to subscribe again.
    pub fn new_channel(
        &self,
        name: impl Into<String>,
        config: ChannelConfig,
    ) -> Channel {
        let name = name.into();
        let channel =
            Channel::new(name.clone(), config, Arc::downgrade(&self.shared));

        let mut channels = self.shared.channels.lock();
        if let Some(previous) = channels.insert(name, channel.clone()) {
            if previous.mark_closed(None).is_ok() {
                previous.evict_members();
            }
        }
        channel
    }

    /// Looks up an open channel by name.
    pub fn channel(&self, name: &str) -> Option<Channel> {
        self.shared.channels.lock().get(name).cloned()
    }

    // --- Connections ---

    /// Accepts TCP connections from `listener` and handles each on its own
    /// task until the engine is closed.
    ///
    /// # Errors
    /// [`Error::EngineClosed`] if the engine is already closed.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::EngineClosed);
        }
        tracing::info!(addr = ?listener.local_addr().ok(), "engine serving");

        loop {
            let accepted = tokio::select! {
                () = self.shared.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    let engine = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = engine.handle(stream).await {
                            tracing::debug!(
                                %peer,
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }

        tracing::info!("engine stopped serving");
        Ok(())
    }

    /// Upgrades one connection and runs its session to completion.
    ///
    /// This is the per-connection entry point for hosts that run their
    /// own accept loop or router. It returns when the session ends.
    ///
    /// # Errors
    /// [`Error::EngineClosed`] if the engine is closed. An upgrade failure
    /// is reported to [`Handler::error`] and returned.
    pub async fn handle<S>(&self, stream: S) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        if self.is_closed() {
            return Err(Error::EngineClosed);
        }

        let transport = self.shared.config.transport();
        match WebSocketConnection::accept(stream, &transport).await {
            Ok((conn, request)) => {
                let session = self.new_session(Some(conn))?;
                self.run(&session, &request).await;
                Ok(())
            }
            Err(err) => {
                let session = self.new_session(None)?;
                let err = Error::from(err);
                tracing::debug!(
                    session_id = session.id(),
                    error = %err,
                    "upgrade failed"
                );
                let _ = session
                    .close_with_status(CloseStatus::AbnormalClosure, "")
                    .await;
                self.shared.handler.error(&session, &err).await;
                Err(err)
            }
        }
    }

    /// Assigns the next id and registers the session in one step.
    pub(crate) fn new_session(
        &self,
        conn: Option<WebSocketConnection>,
    ) -> Result<Session, Error> {
        let mut sessions = self.shared.sessions.lock();
        if self.is_closed() {
            return Err(Error::EngineClosed);
        }
        sessions.last_id += 1;
        let session =
            Session::new(sessions.last_id, Arc::clone(&self.shared), conn);
        sessions.open.insert(session.id(), session.clone());
        Ok(session)
    }

    async fn run(&self, session: &Session, request: &UpgradeRequest) {
        let handler = &self.shared.handler;
        tracing::debug!(
            session_id = session.id(),
            path = request.uri().path(),
            "session opened"
        );

        handler.request(session, request).await;
        // The request callback may reject the peer by closing it.
        if !session.is_closed() {
            handler.connect(session).await;
            if let Some(conn) = session.connection() {
                self.read_loop(session, conn).await;
            }
        }

        let _ = session
            .close_with_status(CloseStatus::NormalClosure, "")
            .await;
        tracing::debug!(session_id = session.id(), "session ended");
    }

    async fn read_loop(&self, session: &Session, conn: &WebSocketConnection) {
        let config = &self.shared.config;
        let handler = &self.shared.handler;

        let mut pinger = config.liveness_enabled().then(|| {
            let mut interval = time::interval_at(
                Instant::now() + config.ping_period,
                config.ping_period,
            );
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        // Set by the first unanswered ping, cleared by any pong.
        let mut pong_deadline: Option<Instant> = None;

        loop {
            let event = tokio::select! {
                frame = conn.recv() => Event::Frame(frame),
                () = next_tick(&mut pinger) => Event::PingDue,
                () = expire(pong_deadline) => Event::Unresponsive,
            };

            match event {
                Event::Frame(Ok(Some(frame))) => match frame {
                    Frame::Text(msg) => handler.message(session, msg).await,
                    Frame::Binary(msg) => {
                        handler.message_binary(session, msg).await;
                    }
                    Frame::Ping(_) => handler.ping(session).await,
                    Frame::Pong(_) => {
                        pong_deadline = None;
                        handler.pong(session).await;
                    }
                    Frame::Close(reason) => {
                        self.peer_closed(session, reason).await;
                        return;
                    }
                },
                Event::Frame(Ok(None)) => {
                    self.fail(session, Error::ConnectionClosed).await;
                    return;
                }
                Event::Frame(Err(err)) => {
                    self.fail(session, err.into()).await;
                    return;
                }
                Event::PingDue => {
                    if let Err(err) = session.ping().await {
                        self.fail(session, err).await;
                        return;
                    }
                    pong_deadline.get_or_insert_with(|| {
                        Instant::now() + config.pong_wait
                    });
                }
                Event::Unresponsive => {
                    tracing::info!(
                        session_id = session.id(),
                        "peer stopped answering pings"
                    );
                    self.fail(session, Error::WriteTimedOut).await;
                    return;
                }
            }
        }
    }

    async fn peer_closed(
        &self,
        session: &Session,
        reason: Option<CloseReason>,
    ) {
        let (status, reason) = match reason {
            Some(CloseReason { status, reason }) => (status, reason),
            None => (CloseStatus::NoStatusReceived, String::new()),
        };
        tracing::debug!(session_id = session.id(), %status, "peer closed");

        let _ = session
            .close_with_status(CloseStatus::NormalClosure, "")
            .await;
        self.shared.handler.close(session, status, &reason).await;
        if status.is_normal() {
            self.shared.handler.disconnect(session).await;
        }
    }

    /// Closes `session` and reports `err`, unless the session was already
    /// closed by someone else.
    async fn fail(&self, session: &Session, err: Error) {
        let status = if err.is_message_too_big() {
            CloseStatus::MessageTooBig
        } else if matches!(err, Error::Transport(_)) {
            CloseStatus::ProtocolError
        } else {
            CloseStatus::GoingAway
        };

        if session.close_with_status(status, "").await.is_ok() {
            tracing::debug!(
                session_id = session.id(),
                error = %err,
                "session failed"
            );
            self.shared.handler.error(session, &err).await;
        }
    }

    // --- Broadcasting ---

    /// Writes a text message to every open session.
    ///
    /// # Errors
    /// [`Error::EngineClosed`] on a closed engine. Per-session failures go
    /// to [`Handler::error`] instead.
    pub async fn broadcast(&self, msg: impl Into<String>) -> Result<(), Error> {
        self.fan_out(Payload::Text(msg.into()), |_| true).await
    }

    /// Writes a text message to every open session `filter` accepts.
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

    /// Writes a text message to every open session except `excluded`.
    pub async fn broadcast_others(
        &self,
        msg: impl Into<String>,
        excluded: &Session,
    ) -> Result<(), Error> {
        let excluded = excluded.id();
        self.fan_out(Payload::Text(msg.into()), |s| s.id() != excluded)
            .await
    }

    /// Writes a text message to each of `sessions`.
    pub async fn broadcast_multiple(
        &self,
        msg: impl Into<String>,
        sessions: &[Session],
    ) -> Result<(), Error> {
        self.send_to(Payload::Text(msg.into()), sessions).await
    }

    /// Writes a binary message to every open session.
    pub async fn broadcast_binary(
        &self,
        msg: impl Into<Vec<u8>>,
    ) -> Result<(), Error> {
        self.fan_out(Payload::Binary(msg.into()), |_| true).await
    }

    /// Writes a binary message to every open session `filter` accepts.
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

    /// Writes a binary message to every open session except `excluded`.
    pub async fn broadcast_binary_others(
        &self,
        msg: impl Into<Vec<u8>>,
        excluded: &Session,
    ) -> Result<(), Error> {
        let excluded = excluded.id();
        self.fan_out(Payload::Binary(msg.into()), |s| s.id() != excluded)
            .await
    }

    /// Writes a binary message to each of `sessions`.
    pub async fn broadcast_binary_multiple(
        &self,
        msg: impl Into<Vec<u8>>,
        sessions: &[Session],
    ) -> Result<(), Error> {
        self.send_to(Payload::Binary(msg.into()), sessions).await
    }

    async fn fan_out<F>(&self, payload: Payload, filter: F) -> Result<(), Error>
    where
        F: Fn(&Session) -> bool,
    {
        if self.is_closed() {
            return Err(Error::EngineClosed);
        }
        // The filter runs outside the table lock; it may call back into
        // the engine.
        let targets: Vec<Session> =
            self.sessions().into_iter().filter(|s| filter(s)).collect();
        tracing::debug!(recipients = targets.len(), "engine broadcast");
        deliver(&targets, &payload).await;
        Ok(())
    }

    async fn send_to(
        &self,
        payload: Payload,
        sessions: &[Session],
    ) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::EngineClosed);
        }
        deliver(sessions, &payload).await;
        Ok(())
    }

    // --- Shutdown ---

    /// Closes every session with status 1001 and stops accepting
    /// connections.
    ///
    /// # Errors
    /// [`Error::EngineClosed`] if the engine was already closed.
    pub async fn close(&self) -> Result<(), Error> {
        self.shut_down(None).await
    }

    /// Like [`close`](Self::close), writing a final text message to each
    /// session first.
    pub async fn close_with_msg(
        &self,
        msg: impl Into<String>,
    ) -> Result<(), Error> {
        self.shut_down(Some(Payload::Text(msg.into()))).await
    }

    /// Like [`close`](Self::close), writing a final binary message to each
    /// session first.
    pub async fn close_with_binary(
        &self,
        msg: impl Into<Vec<u8>>,
    ) -> Result<(), Error> {
        self.shut_down(Some(Payload::Binary(msg.into()))).await
    }

    async fn shut_down(&self, last: Option<Payload>) -> Result<(), Error> {
        let sessions: Vec<Session> = {
            let sessions = self.shared.sessions.lock();
            if self.shared.closed.swap(true, Ordering::SeqCst) {
                return Err(Error::EngineClosed);
            }
            sessions.open.values().cloned().collect()
        };
        self.shared.shutdown.cancel();
        tracing::info!(sessions = sessions.len(), "closing engine");

        let last = last.as_ref();
        join_all(sessions.iter().map(|session| async move {
            if let Some(payload) = last {
                if let Err(err) = payload.write_to(session).await {
                    tracing::debug!(
                        session_id = session.id(),
                        error = %err,
                        "final message not delivered"
                    );
                }
            }
            let _ = session
                .close_with_status(CloseStatus::GoingAway, "")
                .await;
        }))
        .await;
        Ok(())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("sessions", &self.len())
            .field("channels", &self.shared.channels.lock().len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Waits for the next ping tick; never resolves when pings are disabled.
async fn next_tick(pinger: &mut Option<Interval>) {
    match pinger {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

/// Waits until `deadline`; never resolves without one.
async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => pending().await,
    }
}
