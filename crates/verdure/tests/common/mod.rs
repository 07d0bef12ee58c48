//! Shared fixtures: a recording handler, a served engine, and clients.

#![allow(dead_code)]

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use verdure::prelude::*;
use verdure_client::{Client, ClientConfig};

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// How long a test waits before deciding nothing is coming.
pub const QUIET: Duration = Duration::from_millis(200);

/// One handler callback, as observed by a test.
#[derive(Debug)]
pub enum Event {
    Request { path: String, user: Option<String> },
    Connect(Session),
    Disconnect(Session),
    Close(Session, CloseStatus, String),
    Error(Session, String),
    Message(Session, String),
    MessageBinary(Session, Vec<u8>),
    SentMessage(Session, String),
    SentMessageBinary(Session, Vec<u8>),
    Ping(Session),
    Pong(Session),
}

/// Forwards every callback to a channel. With `echo` set, text messages
/// are written back with the suffix appended and binary messages are
/// written back unchanged.
pub struct Recorder {
    tx: mpsc::UnboundedSender<Event>,
    echo: Option<&'static str>,
}

impl Recorder {
    fn record(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

#[async_trait]
impl Handler for Recorder {
    async fn connect(&self, session: &Session) {
        self.record(Event::Connect(session.clone()));
    }

    async fn disconnect(&self, session: &Session) {
        self.record(Event::Disconnect(session.clone()));
    }

    async fn close(
        &self,
        session: &Session,
        status: CloseStatus,
        reason: &str,
    ) {
        self.record(Event::Close(session.clone(), status, reason.to_owned()));
    }

    async fn error(&self, session: &Session, err: &Error) {
        self.record(Event::Error(session.clone(), err.to_string()));
    }

    async fn message(&self, session: &Session, msg: String) {
        if let Some(suffix) = self.echo {
            let _ = session.write(format!("{msg}{suffix}")).await;
        }
        self.record(Event::Message(session.clone(), msg));
    }

    async fn message_binary(&self, session: &Session, msg: Vec<u8>) {
        if self.echo.is_some() {
            let _ = session.write_binary(msg.clone()).await;
        }
        self.record(Event::MessageBinary(session.clone(), msg));
    }

    async fn sent_message(&self, session: &Session, msg: &str) {
        self.record(Event::SentMessage(session.clone(), msg.to_owned()));
    }

    async fn sent_message_binary(&self, session: &Session, msg: &[u8]) {
        self.record(Event::SentMessageBinary(session.clone(), msg.to_vec()));
    }

    async fn ping(&self, session: &Session) {
        self.record(Event::Ping(session.clone()));
    }

    async fn pong(&self, session: &Session) {
        self.record(Event::Pong(session.clone()));
    }

    async fn request(&self, _session: &Session, request: &UpgradeRequest) {
        let user = request
            .headers()
            .get("x-user")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        self.record(Event::Request {
            path: request.uri().path().to_owned(),
            user,
        });
    }
}

/// The receiving end of a [`Recorder`].
pub struct Events {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl Events {
    /// The next event, failing the test after [`WAIT`].
    pub async fn next(&mut self) -> Event {
        tokio::time::timeout(WAIT, self.rx.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("engine dropped the recorder")
    }

    /// Skips events until `pick` returns something.
    pub async fn until<T>(
        &mut self,
        mut pick: impl FnMut(Event) -> Option<T>,
    ) -> T {
        loop {
            if let Some(found) = pick(self.next().await) {
                return found;
            }
        }
    }

    /// Waits for the next `connect` callback.
    pub async fn connected(&mut self) -> Session {
        self.until(|e| match e {
            Event::Connect(session) => Some(session),
            _ => None,
        })
        .await
    }

    /// Waits for the next `error` callback.
    pub async fn error(&mut self) -> (Session, String) {
        self.until(|e| match e {
            Event::Error(session, err) => Some((session, err)),
            _ => None,
        })
        .await
    }

    /// Everything recorded so far, without waiting.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// A served engine and the address it listens on.
pub struct Server {
    pub engine: Engine,
    pub events: Events,
    pub address: String,
}

impl Server {
    /// The `host:port` the engine listens on, for raw TCP peers.
    pub fn host(&self) -> &str {
        self.address
            .trim_start_matches("ws://")
            .trim_end_matches("/ws")
    }

    /// Connects a client and waits until its session is connected.
    pub async fn connect(&mut self) -> (Client, Session) {
        let client = connect(&self.address).await;
        let session = self.events.connected().await;
        (client, session)
    }
}

pub async fn start(config: EngineConfig, echo: Option<&'static str>) -> Server {
    let (tx, rx) = mpsc::unbounded_channel();
    let engine = Engine::new(config, Recorder { tx, echo });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("ws://{}/ws", listener.local_addr().unwrap());
    tokio::spawn({
        let engine = engine.clone();
        async move { engine.serve(listener).await }
    });

    Server {
        engine,
        events: Events { rx },
        address,
    }
}

/// An engine that echoes text back with `" from server!"` appended.
pub async fn start_echo() -> Server {
    start(EngineConfig::default(), Some(" from server!")).await
}

/// An engine that writes nothing on its own.
pub async fn start_quiet() -> Server {
    start(EngineConfig::default(), None).await
}

pub async fn connect(address: &str) -> Client {
    let (client, _) = Client::connect(ClientConfig::new(address))
        .await
        .expect("client should connect");
    client
}

/// Reads one text message, failing the test after [`WAIT`].
pub async fn read(client: &Client) -> String {
    tokio::time::timeout(WAIT, client.read())
        .await
        .expect("timed out waiting for a message")
        .expect("read should succeed")
}

/// Asserts that no text message arrives within [`QUIET`].
pub async fn assert_silent(client: &Client) {
    if let Ok(result) = tokio::time::timeout(QUIET, client.read()).await {
        panic!("expected silence, got {result:?}");
    }
}
