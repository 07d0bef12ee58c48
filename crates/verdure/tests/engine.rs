//! Integration tests for the engine: upgrades, callbacks, broadcasts,
//! liveness, and shutdown, over real sockets.

mod common;

use std::time::Duration;

use common::{
    Event, QUIET, WAIT, assert_silent, connect, read, start, start_echo,
    start_quiet,
};
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use verdure::prelude::*;
use verdure::MessageType;
use verdure_client::{Client, ClientConfig, ClientError};

// =========================================================================
// Upgrade and callbacks
// =========================================================================

#[tokio::test]
async fn test_echo_round_trip_reports_sent_message_once() {
    let mut server = start_echo().await;
    let (client, _session) = server.connect().await;

    client.write("hi").await.unwrap();

    assert_eq!(read(&client).await, "hi from server!");
    let sent = server
        .events
        .until(|e| match e {
            Event::SentMessage(_, msg) => Some(msg),
            _ => None,
        })
        .await;
    assert_eq!(sent, "hi from server!");

    tokio::time::sleep(QUIET).await;
    let extra = server
        .events
        .drain()
        .into_iter()
        .filter(|e| matches!(e, Event::SentMessage(..)))
        .count();
    assert_eq!(extra, 0);
}

#[tokio::test]
async fn test_binary_echo_reports_sent_message_binary() {
    let mut server = start_echo().await;
    let (client, _session) = server.connect().await;

    client.write_binary(vec![0xde, 0xad]).await.unwrap();

    assert_eq!(client.read_binary().await.unwrap(), vec![0xde, 0xad]);
    let sent = server
        .events
        .until(|e| match e {
            Event::SentMessageBinary(_, msg) => Some(msg),
            _ => None,
        })
        .await;
    assert_eq!(sent, vec![0xde, 0xad]);
}

#[tokio::test]
async fn test_request_runs_before_connect_with_upgrade_headers() {
    let mut server = start_quiet().await;
    let mut config = ClientConfig::new(server.address.clone());
    config.header.insert("x-user", "ada".parse().unwrap());

    let (_client, _) = Client::connect(config).await.unwrap();

    match server.events.next().await {
        Event::Request { path, user } => {
            assert_eq!(path, "/ws");
            assert_eq!(user.as_deref(), Some("ada"));
        }
        other => panic!("expected request first, got {other:?}"),
    }
    assert!(matches!(server.events.next().await, Event::Connect(_)));
}

#[tokio::test]
async fn test_session_ids_increase_per_connection() {
    let mut server = start_quiet().await;

    let (_a, first) = server.connect().await;
    let (_b, second) = server.connect().await;

    assert!(second.id() > first.id());
    assert_eq!(server.engine.len(), 2);
}

#[tokio::test]
async fn test_inbound_ping_is_reported_and_answered() {
    let mut server = start_quiet().await;
    let (client, _session) = server.connect().await;

    client.ping().await.unwrap();

    let (kind, _) = client.read_all().await.unwrap();
    assert_eq!(kind, MessageType::Pong);
    server
        .events
        .until(|e| matches!(e, Event::Ping(_)).then_some(()))
        .await;
}

#[tokio::test]
async fn test_upgrade_failure_reports_error_with_session() {
    let mut server = start_quiet().await;
    let mut stream = TcpStream::connect(server.host()).await.unwrap();
    stream
        .write_all(b"GET /ws HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();

    let (session, _err) = server.events.error().await;
    assert!(session.is_closed());
    assert_eq!(server.engine.len(), 0);
}

#[tokio::test]
async fn test_stalled_handshake_reports_session_timed_out() {
    let config = EngineConfig {
        handshake_timeout: Duration::from_millis(100),
        ..EngineConfig::default()
    };
    let mut server = start(config, None).await;

    // Connects but never sends the upgrade request.
    let _stream = TcpStream::connect(server.host()).await.unwrap();

    let (session, err) = server.events.error().await;
    assert_eq!(err, "session timed out");
    assert!(session.is_closed());
    assert_eq!(server.engine.len(), 0);
}

// =========================================================================
// Closing from the peer
// =========================================================================

#[tokio::test]
async fn test_peer_normal_close_reports_close_then_disconnect() {
    let mut server = start_quiet().await;
    let (client, session) = server.connect().await;

    client.disconnect_with_msg("bye").await.unwrap();

    match server.events.next().await {
        Event::Close(closed, status, reason) => {
            assert_eq!(closed, session);
            assert_eq!(status, CloseStatus::NormalClosure);
            assert_eq!(reason, "bye");
        }
        other => panic!("expected close, got {other:?}"),
    }
    assert!(matches!(server.events.next().await, Event::Disconnect(_)));
    assert!(session.is_closed());
    assert_eq!(server.engine.len(), 0);
}

#[tokio::test]
async fn test_peer_close_without_status_reports_no_status_received() {
    let mut server = start_quiet().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(server.address.clone())
        .await
        .unwrap();
    let session = server.events.connected().await;

    ws.close(None).await.unwrap();

    let status = server
        .events
        .until(|e| match e {
            Event::Close(_, status, _) => Some(status),
            _ => None,
        })
        .await;
    assert_eq!(status, CloseStatus::NoStatusReceived);
    assert!(session.is_closed());

    tokio::time::sleep(QUIET).await;
    assert!(
        !server
            .events
            .drain()
            .iter()
            .any(|e| matches!(e, Event::Disconnect(_)))
    );
}

#[tokio::test]
async fn test_peer_going_away_does_not_report_disconnect() {
    let mut server = start_quiet().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(server.address.clone())
        .await
        .unwrap();
    let _session = server.events.connected().await;

    ws.send(Message::Close(Some(
        tokio_tungstenite::tungstenite::protocol::CloseFrame {
            code: 1001.into(),
            reason: "tab closed".into(),
        },
    )))
    .await
    .unwrap();

    let (status, reason) = server
        .events
        .until(|e| match e {
            Event::Close(_, status, reason) => Some((status, reason)),
            _ => None,
        })
        .await;
    assert_eq!(status, CloseStatus::GoingAway);
    assert_eq!(reason, "tab closed");

    // The close handshake completes from the server side.
    let reply = tokio::time::timeout(WAIT, ws.next()).await.unwrap();
    assert!(matches!(reply, Some(Ok(Message::Close(_)))));
}

#[tokio::test]
async fn test_dropped_connection_reports_error_and_closes_session() {
    let mut server = start_quiet().await;
    let (client, session) = server.connect().await;

    client.close().await.unwrap();

    let (failed, _err) = server.events.error().await;
    assert_eq!(failed, session);
    assert!(session.is_closed());
    assert_eq!(server.engine.len(), 0);
}

#[tokio::test]
async fn test_oversize_message_closes_with_1009() {
    let config = EngineConfig {
        max_message_size: 16,
        ..EngineConfig::default()
    };
    let mut server = start(config, None).await;
    let (client, session) = server.connect().await;

    client.write("x".repeat(64)).await.unwrap();

    let (kind, payload) = tokio::time::timeout(WAIT, client.read_all())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kind, MessageType::Close);
    assert_eq!(&payload[..2], &1009_u16.to_be_bytes());

    let (failed, err) = server.events.error().await;
    assert_eq!(failed, session);
    assert!(err.contains("exceeds the limit"), "{err}");
}

// =========================================================================
// Closing from the server
// =========================================================================

#[tokio::test]
async fn test_session_close_sends_normal_closure() {
    let mut server = start_quiet().await;
    let (client, session) = server.connect().await;

    session.close().await.unwrap();

    let (kind, payload) = client.read_all().await.unwrap();
    assert_eq!(kind, MessageType::Close);
    assert_eq!(&payload[..2], &1000_u16.to_be_bytes());
    assert!(matches!(client.read().await, Err(ClientError::ConnectionClosed)));
    assert!(matches!(session.close().await, Err(Error::SessionClosed)));
    assert_eq!(server.engine.len(), 0);
}

#[tokio::test]
async fn test_session_close_with_msg_delivers_then_closes() {
    let mut server = start_quiet().await;
    let (client, session) = server.connect().await;

    session.close_with_msg("last words").await.unwrap();

    assert_eq!(read(&client).await, "last words");
    assert!(matches!(
        client.read().await,
        Err(ClientError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn test_session_close_with_binary_delivers_then_closes() {
    let mut server = start_quiet().await;
    let (client, session) = server.connect().await;

    session.close_with_binary(vec![0xff, 0x00]).await.unwrap();

    assert_eq!(client.read_binary().await.unwrap(), vec![0xff, 0x00]);
    let (kind, payload) = client.read_all().await.unwrap();
    assert_eq!(kind, MessageType::Close);
    assert_eq!(&payload[..2], &1000_u16.to_be_bytes());
    assert!(session.is_closed());
    assert_eq!(server.engine.len(), 0);
}

#[tokio::test]
async fn test_session_closed_in_request_callback_never_connects() {
    struct Reject;

    #[async_trait]
    impl Handler for Reject {
        async fn request(&self, session: &Session, _request: &UpgradeRequest) {
            let _ = session.close().await;
        }

        async fn connect(&self, _session: &Session) {
            panic!("rejected session must not connect");
        }
    }

    let engine = Engine::new(EngineConfig::default(), Reject);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("ws://{}", listener.local_addr().unwrap());
    let handle = tokio::spawn({
        let engine = engine.clone();
        async move {
            let (stream, _) = listener.accept().await.unwrap();
            engine.handle(stream).await
        }
    });

    let client = connect(&address).await;

    assert!(matches!(client.read().await, Err(ClientError::ConnectionClosed)));
    assert!(handle.await.unwrap().is_ok());
    assert!(engine.is_empty());
}

#[tokio::test]
async fn test_engine_close_terminates_clients_and_rejects_upgrades() {
    let mut server = start_quiet().await;
    let (a, _) = server.connect().await;
    let (b, _) = server.connect().await;

    server.engine.close().await.unwrap();

    for client in [&a, &b] {
        let (kind, payload) = client.read_all().await.unwrap();
        assert_eq!(kind, MessageType::Close);
        assert_eq!(&payload[..2], &1001_u16.to_be_bytes());
        assert!(matches!(
            client.read().await,
            Err(ClientError::ConnectionClosed)
        ));
    }
    assert!(server.engine.is_closed());
    assert_eq!(server.engine.len(), 0);

    let (stream, _peer) = tokio::io::duplex(1024);
    assert!(matches!(
        server.engine.handle(stream).await,
        Err(Error::EngineClosed)
    ));
    assert!(matches!(server.engine.close().await, Err(Error::EngineClosed)));
}

#[tokio::test]
async fn test_engine_close_stops_serving() {
    let mut server = start_quiet().await;
    let (_client, _) = server.connect().await;

    server.engine.close().await.unwrap();
    tokio::time::sleep(QUIET).await;

    let result =
        Client::connect(ClientConfig::new(server.address.clone())).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_engine_close_with_msg_delivers_final_message() {
    let mut server = start_quiet().await;
    let (a, _) = server.connect().await;
    let (b, _) = server.connect().await;

    server.engine.close_with_msg("shutting down").await.unwrap();

    assert_eq!(read(&a).await, "shutting down");
    assert_eq!(read(&b).await, "shutting down");
}

#[tokio::test]
async fn test_engine_close_with_binary_delivers_final_message() {
    let mut server = start_quiet().await;
    let (a, _) = server.connect().await;
    let (b, _) = server.connect().await;

    server.engine.close_with_binary(b"eof".to_vec()).await.unwrap();

    for client in [&a, &b] {
        assert_eq!(client.read_binary().await.unwrap(), b"eof");
        let (kind, payload) = client.read_all().await.unwrap();
        assert_eq!(kind, MessageType::Close);
        assert_eq!(&payload[..2], &1001_u16.to_be_bytes());
    }
    assert!(server.engine.is_closed());
    assert_eq!(server.engine.len(), 0);
}

// =========================================================================
// Broadcasts
// =========================================================================

#[tokio::test]
async fn test_broadcast_others_skips_excluded_session() {
    let mut server = start_quiet().await;
    let (a, session_a) = server.connect().await;
    let (b, _) = server.connect().await;
    let (c, _) = server.connect().await;

    server.engine.broadcast_others("ping", &session_a).await.unwrap();

    assert_eq!(read(&b).await, "ping");
    assert_eq!(read(&c).await, "ping");
    assert_silent(&a).await;
}

#[tokio::test]
async fn test_broadcast_reaches_every_session() {
    let mut server = start_quiet().await;
    let (a, _) = server.connect().await;
    let (b, _) = server.connect().await;

    server.engine.broadcast("all hands").await.unwrap();
    server.engine.broadcast_binary(vec![7]).await.unwrap();

    for client in [&a, &b] {
        assert_eq!(read(client).await, "all hands");
        assert_eq!(client.read_binary().await.unwrap(), vec![7]);
    }
}

#[tokio::test]
async fn test_broadcast_filter_uses_session_store() {
    let mut server = start_quiet().await;
    let (red, red_session) = server.connect().await;
    let (blue, blue_session) = server.connect().await;
    red_session.set("team", "red").unwrap();
    blue_session.set("team", "blue").unwrap();

    server
        .engine
        .broadcast_filter("go red", |s| s.get_string("team") == "red")
        .await
        .unwrap();

    assert_eq!(read(&red).await, "go red");
    assert_silent(&blue).await;
}

#[tokio::test]
async fn test_broadcast_multiple_reaches_listed_sessions() {
    let mut server = start_quiet().await;
    let (a, session_a) = server.connect().await;
    let (b, _) = server.connect().await;
    let (c, session_c) = server.connect().await;

    server
        .engine
        .broadcast_binary_multiple(b"hey".to_vec(), &[session_a, session_c])
        .await
        .unwrap();

    assert_eq!(a.read_binary().await.unwrap(), b"hey");
    assert_eq!(c.read_binary().await.unwrap(), b"hey");
    assert!(tokio::time::timeout(QUIET, b.read_binary()).await.is_err());
}

#[tokio::test]
async fn test_broadcast_continues_past_failed_recipient() {
    let mut server = start_quiet().await;
    let (a, session_a) = server.connect().await;
    let (_b, session_b) = server.connect().await;
    session_b.close().await.unwrap();

    server
        .engine
        .broadcast_multiple("still delivered", &[session_b.clone(), session_a])
        .await
        .unwrap();

    assert_eq!(read(&a).await, "still delivered");
    let (failed, err) = server.events.error().await;
    assert_eq!(failed, session_b);
    assert_eq!(err, "session closed");
}

// =========================================================================
// Liveness
// =========================================================================

fn fast_liveness() -> EngineConfig {
    EngineConfig {
        ping_period: Duration::from_millis(50),
        pong_wait: Duration::from_millis(300),
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn test_unresponsive_peer_is_dropped_with_write_timed_out() {
    let mut server = start(fast_liveness(), None).await;
    // Never polled, so it never answers a ping.
    let (_ws, _) = tokio_tungstenite::connect_async(server.address.clone())
        .await
        .unwrap();
    let session = server.events.connected().await;

    let (failed, err) = server.events.error().await;

    assert_eq!(failed, session);
    assert_eq!(err, "write timed out");
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_responsive_peer_stays_connected() {
    let mut server = start(fast_liveness(), None).await;
    let (client, session) = server.connect().await;

    // Reading is what answers the pings.
    let reader = tokio::spawn(async move {
        let msg = client.read().await;
        (client, msg)
    });
    tokio::time::sleep(Duration::from_millis(700)).await;
    session.write("still here").await.unwrap();

    let (_client, msg) = reader.await.unwrap();
    assert_eq!(msg.unwrap(), "still here");
    assert!(!session.is_closed());
    assert!(
        server
            .events
            .drain()
            .iter()
            .any(|e| matches!(e, Event::Pong(_)))
    );
}

#[tokio::test]
async fn test_zero_pong_wait_disables_pings() {
    let config = EngineConfig {
        ping_period: Duration::from_millis(20),
        pong_wait: Duration::ZERO,
        ..EngineConfig::default()
    };
    let mut server = start(config, None).await;
    let (_ws, _) = tokio_tungstenite::connect_async(server.address.clone())
        .await
        .unwrap();
    let session = server.events.connected().await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(!session.is_closed());
    assert!(server.events.drain().is_empty());
}
