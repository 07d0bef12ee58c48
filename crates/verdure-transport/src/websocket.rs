//! WebSocket connection implementation using `tokio-tungstenite`.
//!
//! The stream is split into a write half and a read half, each behind its
//! own lock. Writers queue on the write lock, so data frames and control
//! frames from different tasks never interleave on the wire, while the
//! single reader can wait for the next frame without blocking them.

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Response as
    ClientResponse;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use verdure_protocol::CloseStatus;

use crate::{CloseReason, Connection, Frame, TransportConfig, TransportError};

type BoxSink = Pin<Box<dyn Sink<Message, Error = tungstenite::Error> + Send>>;
type BoxStream =
    Pin<Box<dyn Stream<Item = Result<Message, tungstenite::Error>> + Send>>;

/// A single WebSocket connection, server or client side.
pub struct WebSocketConnection {
    writer: Mutex<Option<BoxSink>>,
    reader: Mutex<Option<BoxStream>>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl WebSocketConnection {
    /// Wraps an established WebSocket stream.
    pub fn new<S>(ws: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = ws.split();
        Self {
            writer: Mutex::new(Some(Box::pin(sink))),
            reader: Mutex::new(Some(Box::pin(stream))),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    /// Performs the server side of the opening handshake on `stream`.
    ///
    /// Returns the connection together with the HTTP upgrade request so
    /// callers can inspect its headers.
    pub async fn accept<S>(
        stream: S,
        config: &TransportConfig,
    ) -> Result<(Self, Request), TransportError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut upgrade_request = None;
        let capture = |req: &Request, resp: Response| {
            upgrade_request = Some(copy_request(req));
            Ok::<Response, ErrorResponse>(resp)
        };

        let handshake = tokio_tungstenite::accept_hdr_async_with_config(
            stream,
            capture,
            Some(config.websocket_config()),
        );
        let ws = match timeout(config.handshake_timeout, handshake).await {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => return Err(TransportError::HandshakeFailed(e)),
            Err(_) => return Err(TransportError::HandshakeTimedOut),
        };

        tracing::debug!("accepted WebSocket connection");
        Ok((Self::new(ws), upgrade_request.unwrap_or_default()))
    }

    /// Performs the client side of the opening handshake.
    pub async fn connect<R>(
        request: R,
        config: &TransportConfig,
    ) -> Result<(Self, ClientResponse), TransportError>
    where
        R: IntoClientRequest + Unpin,
    {
        let handshake = tokio_tungstenite::connect_async_with_config(
            request,
            Some(config.websocket_config()),
            false,
        );
        let (ws, response) =
            match timeout(config.handshake_timeout, handshake).await {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => return Err(TransportError::HandshakeFailed(e)),
                Err(_) => return Err(TransportError::HandshakeTimedOut),
            };

        tracing::debug!(
            status = %response.status(),
            "connected WebSocket client"
        );
        Ok((Self::new(ws), response))
    }

    /// Drops the connection without sending a close frame.
    pub async fn abort(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        self.shutdown.cancel();
        drop(self.writer.lock().await.take());
        self.release_reader();
        Ok(())
    }

    /// Drops the read half unless a reader currently holds it; a
    /// reader that does will drop it when it observes the shutdown.
    fn release_reader(&self) {
        if let Ok(mut reader) = self.reader.try_lock() {
            *reader = None;
        }
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn recv(&self) -> Result<Option<Frame>, Self::Error> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }
        let mut reader = self.reader.lock().await;

        loop {
            let Some(stream) = reader.as_mut() else {
                return Err(TransportError::ConnectionClosed);
            };
            let next = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => None,
                next = stream.next() => Some(next),
            };

            match next {
                None => {
                    *reader = None;
                    return Err(TransportError::ConnectionClosed);
                }
                Some(None) => {
                    *reader = None;
                    return Ok(None);
                }
                Some(Some(Ok(msg))) => {
                    // Raw frames never come out of a read; skip them.
                    if let Some(frame) = Frame::from_message(msg) {
                        return Ok(Some(frame));
                    }
                }
                Some(Some(Err(e))) => {
                    let err = TransportError::from_recv(e);
                    if err.is_closed() {
                        *reader = None;
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn send(
        &self,
        frame: Frame,
        deadline: Instant,
    ) -> Result<(), Self::Error> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        let mut writer = timeout_at(deadline, self.writer.lock())
            .await
            .map_err(|_| TransportError::WriteTimedOut)?;
        let sink = writer.as_mut().ok_or(TransportError::ConnectionClosed)?;

        match timeout_at(deadline, sink.send(frame.into_message())).await {
            Ok(result) => result.map_err(TransportError::from_send),
            Err(_) => Err(TransportError::WriteTimedOut),
        }
    }

    async fn close(
        &self,
        status: CloseStatus,
        reason: &str,
        deadline: Instant,
    ) -> Result<(), Self::Error> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        self.shutdown.cancel();

        // Wait for any in-flight write so the close frame lands after it.
        let sink = match timeout_at(deadline, self.writer.lock()).await {
            Ok(mut writer) => writer.take(),
            Err(_) => None,
        };
        if let Some(mut sink) = sink {
            let frame = Frame::Close(Some(CloseReason::new(status, reason)));
            match timeout_at(deadline, sink.send(frame.into_message())).await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "close frame not delivered");
                }
                Err(_) => tracing::debug!("close frame timed out"),
            }
            // Flushes the reply tungstenite queued if the peer closed first.
            if let Ok(Err(e)) = timeout_at(deadline, sink.close()).await {
                tracing::debug!(error = %e, "close handshake not flushed");
            }
        }
        self.release_reader();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Copies the parts of an upgrade request the handshake callback lends us.
fn copy_request(req: &Request) -> Request {
    let mut copy = Request::new(());
    *copy.method_mut() = req.method().clone();
    *copy.uri_mut() = req.uri().clone();
    *copy.version_mut() = req.version();
    *copy.headers_mut() = req.headers().clone();
    copy
}
