//! # statewire
//!
//! Client for a remote state server, multiplexing commands and
//! subscriptions over a single WebSocket connection.
//!
//! Commands are correlated with their replies by a per-connection serial;
//! subscriptions are keyed by state path and activated on demand by their
//! listeners. Losing the connection fails every in-flight command, and the
//! next successful open replays every active subscription.
//!
//! ## Architecture
//!
//! ```text
//! Caller
//!     │
//!     ├── Connection (client/)
//!     │     ├── PendingTable: serial → one-shot reply
//!     │     └── Subscriptions: path → listeners + last state
//!     │
//!     ├── Wire messages (protocol/)
//!     │
//!     └── Transport (transport/)
//!           ├── WsConnector (tokio-tungstenite)
//!           └── MemoryConnector (in-process)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use statewire::{Connection, WsConnector};
//!
//! # async fn run() -> Result<(), statewire::ClientError> {
//! let conn = Connection::new("ws://127.0.0.1:8000/state", WsConnector::new());
//! let root = conn.subscription("/");
//! let listener = root.on_update(|state| println!("root: {state:?}"));
//! conn.connect();
//!
//! let value = conn.call("/", "ping", vec![], Default::default()).await?;
//! println!("ping -> {value}");
//! root.remove_listener(listener);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;

pub use client::{
    Connection, LifecycleEvent, ListenerId, PendingCommand, Subscription, TransportState, Watcher,
};
pub use config::ClientConfig;
pub use error::ClientError;
pub use transport::{MemoryConnector, WsConnector};
