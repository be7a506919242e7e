//! Live text-to-speech over a bidirectional WebSocket.
//!
//! A call to [`WebSocketSession::tts`] opens one socket and runs two tasks
//! on it: a sender that writes `start`, one `text` frame per fragment, and
//! `stop`; and a driver that reads `audio` frames until `finish` and hands
//! them to the caller through an [`AudioStream`]. Every exit path runs the
//! same teardown before the outcome is surfaced.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::error::Error;
use crate::frame::{FinishReason, Frame};
use crate::inbound::Inbound;
use crate::registry::{ConnectionRegistry, Registration};
use crate::schemas::TtsRequest;
use crate::ws::{self, Connection};

/// Turns an iterator of strings into a text source for [`WebSocketSession::tts`].
pub fn text_stream<I>(items: I) -> impl Stream<Item = Result<String, Infallible>> + Send + 'static
where
    I: IntoIterator + 'static,
    I::Item: Into<String>,
    I::IntoIter: Send + 'static,
{
    futures_util::stream::iter(
        items
            .into_iter()
            .map(|item| Ok::<String, Infallible>(item.into())),
    )
}

/// Registry key for a new session: a full v4 UUID.
fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Leading block of a session id, for log fields.
fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Client for the live TTS endpoint.
///
/// Owns the registry of its open sockets; [`close`](Self::close) shuts all of
/// them down.
#[derive(Debug)]
pub struct WebSocketSession {
    config: ClientConfig,
    registry: ConnectionRegistry,
}

impl WebSocketSession {
    /// Creates a session factory. No connection is opened until [`tts`](Self::tts).
    pub fn new(config: ClientConfig) -> Self {
        let registry = ConnectionRegistry::with_close_grace(config.close_grace);
        Self { config, registry }
    }

    /// Returns the registry of currently open sockets.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Closes every open socket. Safe to call with no active stream.
    pub async fn close(&self) {
        self.registry.close_all().await;
    }

    /// Streams `text` to the server and returns the synthesized audio.
    ///
    /// Fails before streaming starts if the socket cannot be opened within
    /// the configured open timeout.
    pub async fn tts<S, E>(&self, request: TtsRequest, text: S) -> Result<AudioStream, Error>
    where
        S: Stream<Item = Result<String, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let session_id = new_session_id();
        info!(session_id = %short_id(&session_id), "TTS session opening");

        let url = self.config.live_url()?;
        let (sink, source) =
            match ws::connect(&url, &self.config.api_key, self.config.open_timeout).await {
                Ok(halves) => halves,
                Err(e) => {
                    error!(session_id = %short_id(&session_id), error = %e, "TTS session failed to open");
                    return Err(e);
                }
            };

        let (closed_tx, closed_rx) = watch::channel(false);
        let connection = Arc::new(Connection::new(session_id, Box::pin(sink), closed_rx));
        let registration = self.registry.register(Arc::clone(&connection));
        let inbound = Inbound::spawn(source, closed_tx, self.config.inbound_buffer);

        Ok(AudioStream::start(
            connection,
            registration,
            inbound,
            request,
            text,
            self.config.close_grace,
        ))
    }
}

/// Audio chunks of one live TTS call.
///
/// Yields `Ok(chunk)` per `audio` frame and ends after `finish`. A failure is
/// yielded once as the last item. Dropping the stream cancels the call;
/// teardown then completes in the background. Use [`cancel`](Self::cancel)
/// to wait for it.
#[derive(Debug)]
pub struct AudioStream {
    rx: mpsc::Receiver<Result<Vec<u8>, Error>>,
    driver: JoinHandle<()>,
}

impl AudioStream {
    pub(crate) fn start<S, E>(
        connection: Arc<Connection>,
        registration: Registration,
        inbound: Inbound,
        request: TtsRequest,
        text: S,
        grace: Duration,
    ) -> Self
    where
        S: Stream<Item = Result<String, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let call = Call {
            connection,
            registration,
            inbound,
            grace,
        };
        let driver = tokio::spawn(call.run(request, text, tx));
        Self { rx, driver }
    }

    /// Stops consuming and waits until the socket is closed and unregistered.
    pub async fn cancel(self) {
        let AudioStream { rx, driver } = self;
        drop(rx);
        let _ = driver.await;
    }

    /// Reads the stream to the end and concatenates the chunks.
    pub async fn collect_audio(mut self) -> Result<Vec<u8>, Error> {
        let mut audio = Vec::new();
        while let Some(chunk) = self.next().await {
            audio.extend_from_slice(&chunk?);
        }
        Ok(audio)
    }
}

impl Stream for AudioStream {
    type Item = Result<Vec<u8>, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// How the receiver loop ended.
#[derive(Debug)]
enum Outcome {
    Completed,
    Failed(Error),
    Cancelled,
}

/// Resources of one call, released together in [`Call::teardown`].
struct Call {
    connection: Arc<Connection>,
    registration: Registration,
    inbound: Inbound,
    grace: Duration,
}

type AudioSender = mpsc::Sender<Result<Vec<u8>, Error>>;

impl Call {
    async fn run<S, E>(mut self, request: TtsRequest, text: S, tx: AudioSender)
    where
        S: Stream<Item = Result<String, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let id = short_id(self.connection.id()).to_string();
        info!(session_id = %id, "TTS session streaming");

        let sender = tokio::spawn(send_frames(Arc::clone(&self.connection), request, text));
        let outcome = self.receive(&tx).await;
        let sender_result = self.teardown(sender, &outcome).await;

        match outcome {
            Outcome::Completed => match sender_result {
                Some(Err(e)) => {
                    warn!(session_id = %id, error = %e, "TTS session completed but text sender failed");
                    let _ = tx.send(Err(e)).await;
                }
                _ => info!(session_id = %id, "TTS session completed"),
            },
            Outcome::Failed(e) => {
                error!(session_id = %id, error = %e, "TTS session failed");
                let _ = tx.send(Err(e)).await;
            }
            Outcome::Cancelled => info!(session_id = %id, "TTS session cancelled"),
        }
    }

    async fn receive(&mut self, tx: &AudioSender) -> Outcome {
        loop {
            let data = tokio::select! {
                _ = tx.closed() => return Outcome::Cancelled,
                _ = self.connection.released() => {
                    return Outcome::Failed(Error::ConnectionLost(
                        "released after peer did not confirm close".to_string(),
                    ))
                }
                next = self.inbound.next() => match next {
                    Ok(data) => data,
                    Err(e) => return Outcome::Failed(e),
                },
            };

            match Frame::decode(&data) {
                Ok(Frame::Audio { audio }) => {
                    debug!(len = audio.len(), "TTS audio chunk received");
                    if tx.send(Ok(audio)).await.is_err() {
                        return Outcome::Cancelled;
                    }
                }
                Ok(Frame::Finish {
                    reason: FinishReason::Stop,
                }) => return Outcome::Completed,
                Ok(Frame::Finish {
                    reason: FinishReason::Error,
                }) => return Outcome::Failed(Error::RemoteSynthesis),
                Ok(other) => {
                    return Outcome::Failed(Error::Protocol(format!(
                        "unexpected inbound {} frame",
                        other.kind()
                    )))
                }
                Err(e) => return Outcome::Failed(e),
            }
        }
    }

    /// Settles the sender, closes the socket and unregisters it.
    ///
    /// Returns the sender's result if it finished on its own.
    async fn teardown(
        self,
        mut sender: JoinHandle<Result<(), Error>>,
        outcome: &Outcome,
    ) -> Option<Result<(), Error>> {
        let Call {
            connection,
            registration,
            mut inbound,
            grace,
        } = self;
        inbound.close();

        let sender_result = match outcome {
            Outcome::Completed => match timeout(grace, &mut sender).await {
                Ok(joined) => joined.ok(),
                Err(_) => {
                    debug!("Text sender still running after finish, aborting");
                    sender.abort();
                    None
                }
            },
            Outcome::Failed(_) | Outcome::Cancelled => {
                sender.abort();
                let _ = (&mut sender).await;
                None
            }
        };

        connection.close(grace).await;
        registration.release();
        drop(inbound);
        sender_result
    }
}

async fn send_frames<S, E>(connection: Arc<Connection>, request: TtsRequest, text: S) -> Result<(), Error>
where
    S: Stream<Item = Result<String, E>> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    connection.send_frame(&Frame::Start { request }).await?;

    let mut text = std::pin::pin!(text);
    let mut fragments = 0usize;
    while let Some(item) = text.next().await {
        let fragment = item.map_err(|e| Error::TextSource(Box::new(e)))?;
        connection.send_frame(&Frame::Text { text: fragment }).await?;
        fragments += 1;
    }

    connection.send_frame(&Frame::Stop).await?;
    debug!(id = %connection.id(), fragments, "Text stream sent");
    Ok(())
}
