//! In-process transport.
//!
//! [`MemoryConnector`] never touches the network. Every channel it opens is
//! exposed as a [`MemoryPeer`], which plays the server: it records the
//! frames the client wrote and injects open, message, and close events on
//! demand.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

use super::{CloseKind, Connector, EventSink, TransportHandle};
use crate::error::ClientError;

/// Frames written through one channel.
#[derive(Debug, Default)]
struct Wire {
    sent: Vec<String>,
    closed: bool,
}

/// Connector that records every channel it opens.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    peers: Arc<Mutex<Vec<MemoryPeer>>>,
    fail_close: Arc<AtomicBool>,
}

impl MemoryConnector {
    /// Creates a connector with no open channels.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes handles opened from now on report an error when closed.
    pub fn fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Every channel opened so far, oldest first.
    #[must_use]
    pub fn peers(&self) -> Vec<MemoryPeer> {
        self.peers.lock().clone()
    }

    /// The most recently opened channel.
    #[must_use]
    pub fn last_peer(&self) -> Option<MemoryPeer> {
        self.peers.lock().last().cloned()
    }

    /// Number of channels opened so far.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.peers.lock().len()
    }
}

impl Connector for MemoryConnector {
    fn open(&self, endpoint: &str, sink: EventSink) -> Box<dyn TransportHandle> {
        let wire = Arc::new(Mutex::new(Wire::default()));
        self.peers.lock().push(MemoryPeer {
            endpoint: endpoint.to_string(),
            sink,
            wire: Arc::clone(&wire),
        });
        Box::new(MemoryHandle {
            wire,
            fail_close: self.fail_close.load(Ordering::SeqCst),
        })
    }
}

/// Server side of one in-memory channel.
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    endpoint: String,
    sink: EventSink,
    wire: Arc<Mutex<Wire>>,
}

impl MemoryPeer {
    /// Endpoint the client asked for.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Completes the opening handshake.
    pub fn open(&self) {
        self.sink.open();
    }

    /// Pushes a text frame to the client.
    pub fn deliver(&self, text: &str) {
        self.sink.message(text);
    }

    /// Pushes a JSON document to the client.
    pub fn deliver_json(&self, value: &Value) {
        self.sink.message(&value.to_string());
    }

    /// Terminates the channel from the server side.
    pub fn close(&self, kind: CloseKind) {
        self.sink.close(kind);
    }

    /// Frames written by the client, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.wire.lock().sent.clone()
    }

    /// Frames written by the client, parsed as JSON. Unparseable frames
    /// are skipped.
    #[must_use]
    pub fn sent_json(&self) -> Vec<Value> {
        self.wire
            .lock()
            .sent
            .iter()
            .filter_map(|s| serde_json::from_str(s).ok())
            .collect()
    }

    /// Returns `true` once the client has closed its handle.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.wire.lock().closed
    }
}

/// Client side of one in-memory channel.
#[derive(Debug)]
struct MemoryHandle {
    wire: Arc<Mutex<Wire>>,
    fail_close: bool,
}

impl TransportHandle for MemoryHandle {
    fn send(&mut self, text: String) -> Result<(), ClientError> {
        let mut wire = self.wire.lock();
        if wire.closed {
            return Err(ClientError::Transport("channel closed".to_string()));
        }
        wire.sent.push(text);
        Ok(())
    }

    fn close(&mut self) -> Result<(), ClientError> {
        self.wire.lock().closed = true;
        if self.fail_close {
            return Err(ClientError::Transport("close failed".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Weak;

    use super::*;
    use crate::transport::EventHandler;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl EventHandler for Recorder {
        fn on_open(&self, generation: u64) {
            self.events.lock().push(format!("open:{generation}"));
        }
        fn on_message(&self, generation: u64, text: &str) {
            self.events.lock().push(format!("message:{generation}:{text}"));
        }
        fn on_close(&self, generation: u64, kind: CloseKind) {
            self.events.lock().push(format!("close:{generation}:{kind:?}"));
        }
    }

    #[test]
    fn peer_forwards_events_with_generation() {
        let recorder = Arc::new(Recorder::default());
        let weak: Weak<Recorder> = Arc::downgrade(&recorder);
        let connector = MemoryConnector::new();
        let _handle = connector.open("ws://test/state", EventSink::new(4, weak));

        let Some(peer) = connector.last_peer() else {
            panic!("expected an opened peer");
        };
        assert_eq!(peer.endpoint(), "ws://test/state");
        peer.open();
        peer.deliver("hi");
        peer.close(CloseKind::Error);

        assert_eq!(
            *recorder.events.lock(),
            vec!["open:4", "message:4:hi", "close:4:Error"]
        );
    }

    #[test]
    fn handle_records_and_rejects_after_close() {
        let recorder = Arc::new(Recorder::default());
        let weak: Weak<Recorder> = Arc::downgrade(&recorder);
        let connector = MemoryConnector::new();
        let mut handle = connector.open("ws://test/state", EventSink::new(1, weak));

        assert!(handle.send("{\"a\":1}".to_string()).is_ok());
        assert!(handle.close().is_ok());
        assert!(handle.send("late".to_string()).is_err());

        let Some(peer) = connector.last_peer() else {
            panic!("expected an opened peer");
        };
        assert!(peer.is_closed());
        assert_eq!(peer.sent(), vec!["{\"a\":1}"]);
    }

    #[test]
    fn failing_close_reports_error() {
        let recorder = Arc::new(Recorder::default());
        let weak: Weak<Recorder> = Arc::downgrade(&recorder);
        let connector = MemoryConnector::new();
        connector.fail_close(true);
        let mut handle = connector.open("ws://test/state", EventSink::new(1, weak));
        assert!(matches!(handle.close(), Err(ClientError::Transport(_))));
    }

    #[test]
    fn events_after_handler_dropped_are_ignored() {
        let recorder = Arc::new(Recorder::default());
        let weak: Weak<Recorder> = Arc::downgrade(&recorder);
        let connector = MemoryConnector::new();
        let _handle = connector.open("ws://test/state", EventSink::new(1, weak));
        drop(recorder);

        let Some(peer) = connector.last_peer() else {
            panic!("expected an opened peer");
        };
        peer.open();
        peer.deliver("ignored");
    }
}
