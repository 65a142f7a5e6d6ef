//! WebSocket transport.
//!
//! Each call to [`WsConnector::open`] spawns one task that owns the socket.
//! The task runs the read/write loop, forwarding inbound text frames to the
//! [`EventSink`] and writing frames queued through the [`WsHandle`].

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::{CloseKind, Connector, EventSink, TransportHandle};
use crate::error::ClientError;

/// Requests from the handle to the socket task.
#[derive(Debug)]
enum Outgoing {
    Text(String),
    Close,
}

/// Opens WebSocket transports on the current tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    /// Creates a connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    fn open(&self, endpoint: &str, sink: EventSink) -> Box<dyn TransportHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(endpoint.to_string(), sink, rx));
        Box::new(WsHandle { outgoing: tx })
    }
}

/// Handle to a socket task. Dropping it closes the socket.
#[derive(Debug)]
pub struct WsHandle {
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

impl TransportHandle for WsHandle {
    fn send(&mut self, text: String) -> Result<(), ClientError> {
        self.outgoing
            .send(Outgoing::Text(text))
            .map_err(|_| ClientError::Transport("socket task has exited".to_string()))
    }

    fn close(&mut self) -> Result<(), ClientError> {
        self.outgoing
            .send(Outgoing::Close)
            .map_err(|_| ClientError::Transport("socket task has exited".to_string()))
    }
}

/// Connects, then runs the read/write loop until either side closes.
///
/// Exactly one of `open` or `close` is reported for the attempt itself,
/// and one `close` once an open socket terminates. A close requested
/// through the handle reports nothing: the connection has already
/// detached this sink.
async fn run_socket(
    endpoint: String,
    sink: EventSink,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
) {
    let connect = connect_async(endpoint.as_str());
    tokio::pin!(connect);

    let connected = loop {
        tokio::select! {
            result = &mut connect => break result,
            frame = outgoing.recv() => match frame {
                Some(Outgoing::Text(_)) => {
                    tracing::debug!("dropping frame queued before open");
                }
                Some(Outgoing::Close) | None => {
                    tracing::debug!(%endpoint, "close requested while connecting");
                    return;
                }
            }
        }
    };

    let socket = match connected {
        Ok((socket, _response)) => socket,
        Err(e) => {
            tracing::warn!(%endpoint, error = %e, "websocket connect failed");
            sink.close(CloseKind::Error);
            return;
        }
    };

    tracing::debug!(%endpoint, generation = sink.generation(), "websocket open");
    sink.open();

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            // Frame queued by the connection
            frame = outgoing.recv() => {
                match frame {
                    Some(Outgoing::Text(text)) => {
                        if let Err(e) = ws_tx.send(Message::text(text)).await {
                            tracing::warn!(error = %e, "websocket write failed");
                            sink.close(CloseKind::Error);
                            break;
                        }
                    }
                    Some(Outgoing::Close) | None => {
                        if let Err(e) = ws_tx.close().await {
                            tracing::debug!(error = %e, "websocket close handshake failed");
                        }
                        break;
                    }
                }
            }
            // Frame from the server
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => sink.message(text.as_str()),
                    Some(Ok(Message::Close(_))) | None => {
                        sink.close(CloseKind::Closed);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "websocket read failed");
                        sink.close(CloseKind::Error);
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!(%endpoint, generation = sink.generation(), "websocket task finished");
}
