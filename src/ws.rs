//! WebSocket connection wrapper.

use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::frame::Frame;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Write half of a connected socket.
pub type WsSink = SplitSink<WsStream, Message>;

/// Read half of a connected socket.
pub type WsSource = SplitStream<WsStream>;

/// Type-erased write half owned by a [`Connection`].
pub(crate) type BoxSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Lifecycle of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closing,
    Closed,
}

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Opens a socket to `url` with the API key as a bearer token.
///
/// The whole handshake is bounded by `open_timeout`.
pub async fn connect(
    url: &str,
    api_key: &str,
    open_timeout: Duration,
) -> Result<(WsSink, WsSource), Error> {
    info!(url = %url, "WebSocket connecting");

    let mut request = url.into_client_request()?;
    let bearer = format!("Bearer {api_key}").parse()?;
    request.headers_mut().insert(AUTHORIZATION, bearer);

    let (ws_stream, _) = timeout(open_timeout, tokio_tungstenite::connect_async(request))
        .await
        .map_err(|_| Error::ConnectionTimeout)?
        .map_err(handshake_error)?;

    info!(url = %url, "WebSocket connected");
    Ok(ws_stream.split())
}

fn handshake_error(err: WsError) -> Error {
    match err {
        WsError::Http(response) => {
            let status = response.status();
            Error::Http {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("upgrade rejected")
                    .to_string(),
            }
        }
        other => Error::ConnectionLost(other.to_string()),
    }
}

/// One live socket: the write half plus the closed signal raised by the
/// inbound pump.
pub struct Connection {
    id: String,
    write: Mutex<Option<BoxSink>>,
    state: AtomicU8,
    closed: watch::Receiver<bool>,
    released: watch::Sender<bool>,
}

impl Connection {
    /// Wraps a write half. `closed` flips to true (or its sender drops) once
    /// the read half has observed the end of the socket.
    pub(crate) fn new(id: String, sink: BoxSink, closed: watch::Receiver<bool>) -> Self {
        Self {
            id,
            write: Mutex::new(Some(sink)),
            state: AtomicU8::new(OPEN),
            closed,
            released: watch::channel(false).0,
        }
    }

    /// Registry key of this connection.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::SeqCst) {
            OPEN => ConnectionState::Open,
            CLOSING => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }

    /// Encodes and sends one frame as a binary message.
    pub async fn send_frame(&self, frame: &Frame) -> Result<(), Error> {
        let data = frame.encode()?;
        let mut writer = self.write.lock().await;
        let sink = match writer.as_mut() {
            Some(sink) if self.state() == ConnectionState::Open => sink,
            _ => return Err(Error::ConnectionLost("connection closed".to_string())),
        };
        debug!(id = %self.id, kind = frame.kind(), len = data.len(), "Sending frame");
        sink.send(Message::Binary(data))
            .await
            .map_err(|e| Error::ConnectionLost(e.to_string()))
    }

    /// Closes the socket and waits up to `grace` for the peer to confirm.
    ///
    /// Only the first call sends a close request; later calls just wait for
    /// the outcome. A peer that does not confirm in time is released anyway:
    /// the connection is marked closed and [`released`](Self::released)
    /// fires so the reader can be dropped.
    pub async fn close(&self, grace: Duration) {
        if self
            .state
            .compare_exchange(OPEN, CLOSING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            if self.state() != ConnectionState::Closed {
                self.wait_closed(grace).await;
            }
            return;
        }

        info!(id = %self.id, "WebSocket closing");
        let handshake = async {
            let mut writer = self.write.lock().await;
            if let Some(mut sink) = writer.take() {
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
            }
        };
        let confirmed = timeout(grace, handshake).await.is_ok() && self.wait_closed(grace).await;
        self.state.store(CLOSED, Ordering::SeqCst);
        if confirmed {
            info!(id = %self.id, "WebSocket closed");
        } else {
            warn!(id = %self.id, grace_ms = grace.as_millis() as u64, "Peer did not confirm close, releasing socket");
            self.released.send_replace(true);
        }
    }

    /// Resolves once a close gave up waiting for the peer.
    ///
    /// Whoever owns the read half must drop it when this fires.
    pub async fn released(&self) {
        let mut released = self.released.subscribe();
        let _ = released.wait_for(|released| *released).await;
    }

    /// True if the socket was released without the peer confirming.
    pub fn is_released(&self) -> bool {
        *self.released.borrow()
    }

    async fn wait_closed(&self, grace: Duration) -> bool {
        let mut closed = self.closed.clone();
        let wait = async move {
            while !*closed.borrow_and_update() {
                if closed.changed().await.is_err() {
                    break;
                }
            }
        };
        timeout(grace, wait).await.is_ok()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
