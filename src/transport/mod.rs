//! Transport layer: the injected channel that carries text frames.
//!
//! A [`Connector`] opens one channel per connection attempt and hands back
//! an exclusively owned [`TransportHandle`]. Everything the channel
//! observes flows back through the [`EventSink`] it was given. Each sink
//! is stamped with the connection generation that opened it; once the
//! connection moves on to a newer generation the sink is detached and its
//! events are dropped on the floor.

use std::fmt;
use std::sync::Weak;

use crate::error::ClientError;

pub mod memory;
pub mod websocket;

pub use memory::{MemoryConnector, MemoryPeer};
pub use websocket::WsConnector;

/// How a transport terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Orderly close by either side.
    Closed,
    /// The channel failed to open or broke while open.
    Error,
}

/// Receiver of transport events, implemented by the connection.
pub trait EventHandler: Send + Sync {
    /// The channel opened.
    fn on_open(&self, generation: u64);
    /// A text frame arrived.
    fn on_message(&self, generation: u64, text: &str);
    /// The channel closed or failed.
    fn on_close(&self, generation: u64, kind: CloseKind);
}

/// Callback slots handed to a transport when it is opened.
///
/// Holds only a weak reference to its handler; events delivered after
/// the connection is gone are ignored.
#[derive(Clone)]
pub struct EventSink {
    generation: u64,
    handler: Weak<dyn EventHandler>,
}

impl EventSink {
    /// Creates a sink bound to `handler` for one connection generation.
    #[must_use]
    pub fn new(generation: u64, handler: Weak<dyn EventHandler>) -> Self {
        Self {
            generation,
            handler,
        }
    }

    /// Generation this sink was opened for.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Reports that the channel is open.
    pub fn open(&self) {
        if let Some(handler) = self.handler.upgrade() {
            handler.on_open(self.generation);
        }
    }

    /// Delivers an inbound text frame.
    pub fn message(&self, text: &str) {
        if let Some(handler) = self.handler.upgrade() {
            handler.on_message(self.generation, text);
        }
    }

    /// Reports that the channel terminated.
    pub fn close(&self, kind: CloseKind) {
        if let Some(handler) = self.handler.upgrade() {
            handler.on_close(self.generation, kind);
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("generation", &self.generation)
            .field("attached", &(self.handler.strong_count() > 0))
            .finish()
    }
}

/// Owned handle to one open (or opening) channel.
pub trait TransportHandle: Send {
    /// Queues a text frame for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the channel can no longer
    /// accept frames.
    fn send(&mut self, text: String) -> Result<(), ClientError>;

    /// Requests that the channel close.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the close request could not be
    /// delivered.
    fn close(&mut self) -> Result<(), ClientError>;
}

/// Factory for transports.
///
/// Implementations must report events asynchronously: calling into the
/// sink from inside [`Connector::open`] is not allowed.
pub trait Connector: Send + Sync + 'static {
    /// Starts opening a channel to `endpoint`.
    fn open(&self, endpoint: &str, sink: EventSink) -> Box<dyn TransportHandle>;
}
