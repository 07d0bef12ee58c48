use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use verdure::prelude::*;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// What a client may send. Anything that does not parse is echoed back.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Command {
    Nick { name: String },
    Say { text: String },
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Notice<'a> {
    Joined { id: SessionId },
    Left { id: SessionId },
    Said { from: &'a str, text: &'a str },
}

impl Notice<'_> {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

const LOBBY: &str = "lobby";

struct Lobby;

#[async_trait]
impl Handler for Lobby {
    async fn connect(&self, session: &Session) {
        let _ = session.set("nick", format!("guest-{}", session.id()));
        if let Err(e) = session.subscribe(LOBBY) {
            tracing::warn!(
                session_id = session.id(),
                error = %e,
                "could not join lobby"
            );
            return;
        }
        let _ = session.set(JOINED, true);
        announce(session, Notice::Joined { id: session.id() }).await;
    }

    async fn close(
        &self,
        session: &Session,
        status: CloseStatus,
        _reason: &str,
    ) {
        tracing::info!(session_id = session.id(), %status, "closed");
        leave(session).await;
    }

    async fn error(&self, session: &Session, err: &Error) {
        tracing::warn!(
            session_id = session.id(),
            error = %err,
            "session error"
        );
        leave(session).await;
    }

    async fn message(&self, session: &Session, msg: String) {
        match serde_json::from_str::<Command>(&msg) {
            Ok(Command::Nick { name }) => {
                let _ = session.set("nick", name);
            }
            Ok(Command::Say { text }) => {
                let from = session.get_string("nick");
                let notice = Notice::Said {
                    from: &from,
                    text: &text,
                };
                announce(session, notice).await;
            }
            Err(_) => {
                let _ = session.write(msg).await;
            }
        }
    }

    async fn message_binary(&self, session: &Session, msg: Vec<u8>) {
        let _ = session.write_binary(msg).await;
    }
}

/// Set once in `main`; the handler looks the lobby up through it.
static ENGINE: OnceLock<Engine> = OnceLock::new();

/// Store key marking a session that joined the lobby and has not been
/// announced as gone yet.
const JOINED: &str = "joined";

/// Announces a closed session's departure once, whichever of `close` or
/// `error` reports it first. The store is used directly because the
/// session's own `delete` refuses once it is closed.
async fn leave(session: &Session) {
    if session.is_closed() && session.store().delete(JOINED).is_ok() {
        announce(session, Notice::Left { id: session.id() }).await;
    }
}

/// Tells everyone else in the lobby about `notice`.
async fn announce(session: &Session, notice: Notice<'_>) {
    let lobby = ENGINE.get().and_then(|engine| engine.channel(LOBBY));
    let Some(lobby) = lobby else {
        return;
    };
    if let Err(e) = lobby.broadcast_others(notice.to_json(), session).await {
        tracing::warn!(error = %e, "lobby broadcast failed");
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::var("ECHO_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8080".into());
    let engine =
        ENGINE.get_or_init(|| Engine::new(EngineConfig::default(), Lobby));
    engine.new_channel(LOBBY, ChannelConfig::default());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    println!("echo listening on ws://{addr}");

    let serving = tokio::spawn({
        let engine = engine.clone();
        async move { engine.serve(listener).await }
    });

    tokio::signal::ctrl_c().await?;
    engine.close_with_msg("server shutting down").await?;
    serving.await??;
    Ok(())
}
