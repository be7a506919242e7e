//! Pull-based view of a socket's read half.
//!
//! A pump task drains the socket into a bounded FIFO so no message is lost
//! while the consumer is busy; the consumer pulls one message at a time.

use futures_util::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, trace, warn};

use crate::error::Error;

#[derive(Debug)]
enum SocketEvent {
    Message(Vec<u8>),
    Error(String),
    Closed(String),
}

/// Inbound message sequence of one connection.
///
/// `next` takes `&mut self`, so there is never more than one pending fetch.
#[derive(Debug)]
pub struct Inbound {
    rx: mpsc::Receiver<SocketEvent>,
    pump: JoinHandle<()>,
}

impl Inbound {
    /// Starts pumping `source` into a FIFO of `capacity` messages.
    ///
    /// `closed` is raised as soon as the socket is observed closed, even if
    /// the consumer is not reading.
    pub fn spawn<S>(source: S, closed: watch::Sender<bool>, capacity: usize) -> Self
    where
        S: Stream<Item = Result<Message, WsError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let pump = tokio::spawn(pump(source, tx, closed));
        Self { rx, pump }
    }

    /// Returns the next message payload, buffered ones first.
    ///
    /// Fails with [`Error::ConnectionLost`] once the socket errors or closes.
    pub async fn next(&mut self) -> Result<Vec<u8>, Error> {
        match self.rx.recv().await {
            Some(SocketEvent::Message(data)) => Ok(data),
            Some(SocketEvent::Error(reason)) | Some(SocketEvent::Closed(reason)) => {
                Err(Error::ConnectionLost(reason))
            }
            None => Err(Error::ConnectionLost("inbound stream ended".to_string())),
        }
    }

    /// Stops accepting events. The pump keeps draining the socket so a close
    /// handshake can still complete.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl Drop for Inbound {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn pump<S>(source: S, tx: mpsc::Sender<SocketEvent>, closed: watch::Sender<bool>)
where
    S: Stream<Item = Result<Message, WsError>> + Send,
{
    let mut source = std::pin::pin!(source);
    let mut draining = false;

    let last = loop {
        let event = match source.next().await {
            Some(Ok(Message::Binary(data))) => SocketEvent::Message(data),
            Some(Ok(Message::Text(text))) => SocketEvent::Message(text.into_bytes()),
            Some(Ok(Message::Close(frame))) => {
                debug!(frame = ?frame, "Received close");
                let reason = match frame {
                    Some(frame) if !frame.reason.is_empty() => {
                        format!("closed by peer: {}", frame.reason)
                    }
                    _ => "closed by peer".to_string(),
                };
                break SocketEvent::Closed(reason);
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!(error = %e, "WebSocket read failed");
                break SocketEvent::Error(e.to_string());
            }
            None => break SocketEvent::Closed("socket closed".to_string()),
        };

        if draining {
            trace!("Discarding inbound message after consumer left");
            continue;
        }
        if tx.send(event).await.is_err() {
            debug!("Inbound consumer gone, draining socket");
            draining = true;
        }
    };

    closed.send_replace(true);
    if !draining {
        let _ = tx.send(last).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    fn socket() -> (
        mpsc::UnboundedSender<Result<Message, WsError>>,
        impl Stream<Item = Result<Message, WsError>> + Send + 'static,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        (tx, source)
    }

    #[tokio::test]
    async fn test_buffers_messages_in_arrival_order() {
        let (socket_tx, source) = socket();
        let (closed_tx, _closed_rx) = watch::channel(false);

        // All of these arrive before anyone asks for them.
        for i in 0..5u8 {
            socket_tx.send(Ok(Message::Binary(vec![i]))).unwrap();
        }
        let mut inbound = Inbound::spawn(source, closed_tx, 16);
        tokio::time::sleep(Duration::from_millis(20)).await;

        for i in 0..5u8 {
            assert_eq!(inbound.next().await.unwrap(), vec![i]);
        }
    }

    #[tokio::test]
    async fn test_skips_control_messages() {
        let (socket_tx, source) = socket();
        let (closed_tx, _closed_rx) = watch::channel(false);
        let mut inbound = Inbound::spawn(source, closed_tx, 4);

        socket_tx.send(Ok(Message::Ping(vec![1]))).unwrap();
        socket_tx.send(Ok(Message::Pong(vec![2]))).unwrap();
        socket_tx.send(Ok(Message::Binary(vec![3]))).unwrap();

        assert_eq!(inbound.next().await.unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_close_fails_pending_fetch() {
        let (socket_tx, source) = socket();
        let (closed_tx, mut closed_rx) = watch::channel(false);
        let mut inbound = Inbound::spawn(source, closed_tx, 4);

        socket_tx
            .send(Ok(Message::Close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "bye".into(),
            }))))
            .unwrap();

        match inbound.next().await {
            Err(Error::ConnectionLost(reason)) => assert!(reason.contains("bye")),
            other => panic!("unexpected: {other:?}"),
        }
        closed_rx.changed().await.unwrap();
        assert!(*closed_rx.borrow());
    }

    #[tokio::test]
    async fn test_error_fails_pending_fetch() {
        let (socket_tx, source) = socket();
        let (closed_tx, _closed_rx) = watch::channel(false);
        let mut inbound = Inbound::spawn(source, closed_tx, 4);

        socket_tx.send(Ok(Message::Binary(vec![1]))).unwrap();
        socket_tx.send(Err(WsError::ConnectionClosed)).unwrap();

        assert_eq!(inbound.next().await.unwrap(), vec![1]);
        assert!(matches!(
            inbound.next().await,
            Err(Error::ConnectionLost(_))
        ));
        // The sequence stays terminated.
        assert!(matches!(
            inbound.next().await,
            Err(Error::ConnectionLost(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_consumer_still_drains_to_close() {
        let (socket_tx, source) = socket();
        let (closed_tx, mut closed_rx) = watch::channel(false);
        let mut inbound = Inbound::spawn(source, closed_tx, 1);

        // Fill the FIFO so the pump is blocked on backpressure.
        for i in 0..4u8 {
            socket_tx.send(Ok(Message::Binary(vec![i]))).unwrap();
        }
        inbound.close();
        socket_tx.send(Ok(Message::Close(None))).unwrap();

        tokio::time::timeout(Duration::from_secs(1), closed_rx.changed())
            .await
            .expect("pump should reach the close")
            .unwrap();
    }

    #[tokio::test]
    async fn test_drop_stops_pump() {
        let (socket_tx, source) = socket();
        let (closed_tx, mut closed_rx) = watch::channel(false);
        let inbound = Inbound::spawn(source, closed_tx, 4);

        drop(inbound);

        // Aborting the pump drops the closed sender.
        assert!(closed_rx.changed().await.is_err());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(socket_tx.send(Ok(Message::Binary(vec![1]))).is_err());
    }
}
