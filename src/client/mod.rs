//! Client layer: the connection, its subscriptions, and in-flight commands.
//!
//! A [`Connection`] owns one transport at a time and multiplexes command
//! replies and subscription pushes over it. [`Subscription`] handles are
//! shared with any number of observers; [`PendingCommand`] futures complete
//! exactly once.

pub mod connection;
pub mod lifecycle;
pub mod pending;
pub mod subscription;

pub use connection::{Connection, DEFAULT_LIFECYCLE_CAPACITY, TransportState};
pub use lifecycle::{LifecycleBus, LifecycleEvent};
pub use pending::PendingCommand;
pub use subscription::{ListenerId, Subscription, UpdateListener, Watcher};
