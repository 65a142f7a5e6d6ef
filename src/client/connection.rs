//! The multiplexed connection to a state server.
//!
//! One [`Connection`] carries two kinds of traffic over a single transport:
//! commands, which get exactly one reply correlated by serial, and
//! subscriptions, which get any number of pushes keyed by path. The
//! connection owns the transport, the table of in-flight commands, and the
//! table of subscriptions, and keeps them consistent across reconnects.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use super::lifecycle::{LifecycleBus, LifecycleEvent};
use super::pending::{PendingCommand, PendingTable};
use super::subscription::{SendFn, Subscription};
use crate::error::ClientError;
use crate::protocol::{CommandReply, InboundMessage, OutboundMessage};
use crate::transport::{CloseKind, Connector, EventHandler, EventSink, TransportHandle};

/// Default capacity of the lifecycle broadcast channel.
pub const DEFAULT_LIFECYCLE_CAPACITY: usize = 64;

/// Transport state as seen by the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// No transport.
    Disconnected,
    /// A transport is opening.
    Connecting,
    /// The transport is open; frames are written.
    Connected,
}

/// Everything guarded by the link lock.
struct Link {
    state: TransportState,
    transport: Option<Box<dyn TransportHandle>>,
    /// Bumped on every disconnect; events from older transports are stale.
    generation: u64,
    next_serial: u64,
    pending: PendingTable,
}

struct Shared {
    endpoint: String,
    connector: Box<dyn Connector>,
    link: Mutex<Link>,
    subscriptions: Mutex<HashMap<String, Subscription>>,
    lifecycle: LifecycleBus,
}

/// Client connection to one state server endpoint.
///
/// Cheap to clone; every clone drives the same connection. When the last
/// clone is dropped the transport is dropped with it and any outstanding
/// command fails with [`ClientError::ConnectionClosed`].
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Creates a disconnected connection to `endpoint`.
    pub fn new(endpoint: impl Into<String>, connector: impl Connector) -> Self {
        Self::with_lifecycle_capacity(endpoint, connector, DEFAULT_LIFECYCLE_CAPACITY)
    }

    /// Creates a disconnected connection whose lifecycle channel buffers
    /// `capacity` events per receiver.
    pub fn with_lifecycle_capacity(
        endpoint: impl Into<String>,
        connector: impl Connector,
        capacity: usize,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                endpoint: endpoint.into(),
                connector: Box::new(connector),
                link: Mutex::new(Link {
                    state: TransportState::Disconnected,
                    transport: None,
                    generation: 0,
                    next_serial: 1,
                    pending: PendingTable::default(),
                }),
                subscriptions: Mutex::new(HashMap::new()),
                lifecycle: LifecycleBus::new(capacity),
            }),
        }
    }

    /// Address of the remote server.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    /// Current transport state.
    #[must_use]
    pub fn state(&self) -> TransportState {
        self.shared.link.lock().state
    }

    /// Number of commands awaiting a reply.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.link.lock().pending.len()
    }

    /// Receiver for lifecycle events published from now on.
    #[must_use]
    pub fn lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.shared.lifecycle.subscribe()
    }

    /// Opens a fresh transport, tearing down the current one first.
    ///
    /// Publishes [`LifecycleEvent::Connecting`]; the outcome arrives later
    /// as `Open`, `Closed`, or `Error`.
    pub fn connect(&self) {
        self.shared.disconnect();
        self.shared.lifecycle.publish(LifecycleEvent::Connecting);

        let handler: Weak<Shared> = Arc::downgrade(&self.shared);
        let handler: Weak<dyn EventHandler> = handler;

        let mut link = self.shared.link.lock();
        link.state = TransportState::Connecting;
        let sink = EventSink::new(link.generation, handler);
        tracing::info!(
            endpoint = %self.shared.endpoint,
            generation = link.generation,
            "connecting"
        );
        let transport = self.shared.connector.open(&self.shared.endpoint, sink);
        link.transport = Some(transport);
    }

    /// Tears down the transport and fails every pending command.
    ///
    /// Idempotent. Subscriptions and the serial counter survive.
    pub fn disconnect(&self) {
        self.shared.disconnect();
    }

    /// Sends a command and returns the future for its reply.
    ///
    /// If the connection is not open the frame is dropped; the future then
    /// stays pending until the next disconnect (or `connect()`) fails it.
    pub fn send_command(
        &self,
        path: &str,
        command: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> PendingCommand {
        let pending = {
            let mut link = self.shared.link.lock();
            let serial = link.next_serial;
            link.next_serial += 1;
            link.pending.register(serial)
        };

        self.shared.send(&OutboundMessage::Command {
            path: path.to_string(),
            command: command.to_string(),
            args,
            kwargs,
            id: pending.serial(),
        });
        pending
    }

    /// Sends a command and interprets its reply.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectionClosed`] if the connection drops
    /// first, or [`ClientError::Command`] if the server reports a failure.
    pub async fn call(
        &self,
        path: &str,
        command: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, ClientError> {
        let payload = self.send_command(path, command, args, kwargs).await?;
        CommandReply::from_payload(&payload).into_result()
    }

    /// Returns the subscription for `path`, creating it on first use.
    ///
    /// Repeated calls with the same path return the same subscription for
    /// the lifetime of the connection.
    pub fn subscription(&self, path: &str) -> Subscription {
        let mut subs = self.shared.subscriptions.lock();
        if let Some(sub) = subs.get(path) {
            return sub.clone();
        }

        let weak = Arc::downgrade(&self.shared);
        let send: SendFn = Arc::new(move |msg: &OutboundMessage| {
            if let Some(shared) = weak.upgrade() {
                shared.send(msg);
            }
        });
        let sub = Subscription::new(path.to_string(), send);
        subs.insert(path.to_string(), sub.clone());
        sub
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let link = self.shared.link.lock();
        f.debug_struct("Connection")
            .field("endpoint", &self.shared.endpoint)
            .field("state", &link.state)
            .field("generation", &link.generation)
            .field("next_serial", &link.next_serial)
            .field("pending", &link.pending.len())
            .finish_non_exhaustive()
    }
}

impl Shared {
    /// Writes `msg` if the transport is open; otherwise drops it.
    fn send(&self, msg: &OutboundMessage) {
        let text = match msg.encode() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode outbound message");
                return;
            }
        };

        let mut link = self.link.lock();
        if link.state != TransportState::Connected {
            tracing::debug!(state = ?link.state, "not connected, dropping message");
            return;
        }
        if let Some(transport) = link.transport.as_mut() {
            tracing::trace!(%text, "sending message");
            if let Err(e) = transport.send(text) {
                tracing::warn!(error = %e, "transport send failed");
            }
        }
    }

    fn disconnect(&self) {
        let (transport, pending) = {
            let mut link = self.link.lock();
            link.generation += 1;
            link.state = TransportState::Disconnected;
            (link.transport.take(), link.pending.take_all())
        };

        if let Some(mut transport) = transport {
            tracing::info!(endpoint = %self.endpoint, "disconnecting");
            if let Err(e) = transport.close() {
                tracing::warn!(error = %e, "error while closing transport");
            }
        }

        if !pending.is_empty() {
            tracing::debug!(count = pending.len(), "rejecting pending commands");
        }
        pending.reject_all();
    }

    fn is_current(&self, generation: u64) -> bool {
        self.link.lock().generation == generation
    }

    fn dispatch(&self, generation: u64, msg: InboundMessage) {
        match msg {
            InboundMessage::Reply { id, payload } => {
                let mut link = self.link.lock();
                if link.generation != generation {
                    return;
                }
                if !link.pending.resolve(id, payload) {
                    tracing::debug!(id, "ignoring reply for unknown command");
                }
            }
            InboundMessage::Push { path, state } => {
                let sub = self.subscriptions.lock().get(&path).cloned();
                match sub {
                    Some(sub) => sub.update(state),
                    None => tracing::debug!(%path, "ignoring push for unknown path"),
                }
            }
            InboundMessage::Unrecognized(_) => {
                tracing::debug!("ignoring unrecognized message");
            }
        }
    }
}

impl EventHandler for Shared {
    fn on_open(&self, generation: u64) {
        {
            let mut link = self.link.lock();
            if link.generation != generation {
                return;
            }
            link.state = TransportState::Connected;
        }
        tracing::info!(endpoint = %self.endpoint, "connected");
        self.lifecycle.publish(LifecycleEvent::Open);

        let subs: Vec<Subscription> = self.subscriptions.lock().values().cloned().collect();
        for sub in subs {
            sub.replay();
        }
    }

    fn on_message(&self, generation: u64, text: &str) {
        if !self.is_current(generation) {
            return;
        }
        match InboundMessage::decode(text) {
            Ok(msg) => self.dispatch(generation, msg),
            Err(e) => tracing::warn!(error = %e, "ignoring malformed message"),
        }
    }

    fn on_close(&self, generation: u64, kind: CloseKind) {
        if !self.is_current(generation) {
            return;
        }
        match kind {
            CloseKind::Error => {
                tracing::warn!(endpoint = %self.endpoint, "connection error");
                self.lifecycle.publish(LifecycleEvent::Error);
            }
            CloseKind::Closed => {
                tracing::info!(endpoint = %self.endpoint, "connection closed");
                self.lifecycle.publish(LifecycleEvent::Closed);
            }
        }
        self.disconnect();
    }
}
