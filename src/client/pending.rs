//! In-flight command table.
//!
//! Each command gets a one-shot completion handle keyed by its serial.
//! Completing a handle consumes it, so a command can be answered at most
//! once no matter which task delivers the reply.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::ClientError;

type Completion = oneshot::Sender<Result<Value, ClientError>>;

/// Serial → completion handle for every unanswered command.
#[derive(Debug, Default)]
pub(crate) struct PendingTable {
    entries: HashMap<u64, Completion>,
}

impl PendingTable {
    /// Registers `serial` and returns the future its reply will complete.
    pub(crate) fn register(&mut self, serial: u64) -> PendingCommand {
        let (tx, rx) = oneshot::channel();
        self.entries.insert(serial, tx);
        PendingCommand { serial, rx }
    }

    /// Completes `serial` with `payload`. Returns `false` if the serial is
    /// not pending.
    pub(crate) fn resolve(&mut self, serial: u64, payload: Value) -> bool {
        match self.entries.remove(&serial) {
            Some(tx) => {
                // The caller may have dropped its future; nothing to do then.
                let _ = tx.send(Ok(payload));
                true
            }
            None => false,
        }
    }

    /// Empties the table, returning the drained entries for rejection.
    pub(crate) fn take_all(&mut self) -> PendingTable {
        std::mem::take(self)
    }

    /// Fails every entry with [`ClientError::ConnectionClosed`].
    pub(crate) fn reject_all(self) {
        for (_, tx) in self.entries {
            let _ = tx.send(Err(ClientError::ConnectionClosed));
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Future for the reply to one command.
///
/// Resolves with the complete reply payload, or fails with
/// [`ClientError::ConnectionClosed`] if the connection is torn down (or
/// dropped) first.
#[derive(Debug)]
#[must_use = "the reply is delivered through this future"]
pub struct PendingCommand {
    serial: u64,
    rx: oneshot::Receiver<Result<Value, ClientError>>,
}

impl PendingCommand {
    /// Serial assigned to the command.
    #[must_use]
    pub const fn serial(&self) -> u64 {
        self.serial
    }
}

impl Future for PendingCommand {
    type Output = Result<Value, ClientError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ClientError::ConnectionClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::task;
    use tokio_test::{assert_pending, assert_ready};

    #[test]
    fn resolve_completes_once() {
        let mut table = PendingTable::default();
        let mut fut = task::spawn(table.register(1));
        assert_pending!(fut.poll());

        assert!(table.resolve(1, json!({"id": 1, "result": 42})));
        assert!(!table.resolve(1, json!({"id": 1, "result": 43})));
        assert!(fut.is_woken());

        let Ok(payload) = assert_ready!(fut.poll()) else {
            panic!("expected a reply");
        };
        assert_eq!(payload, json!({"id": 1, "result": 42}));
    }

    #[test]
    fn unknown_serial_is_not_resolved() {
        let mut table = PendingTable::default();
        assert!(!table.resolve(9, json!({"id": 9})));
    }

    #[test]
    fn reject_all_fails_every_entry() {
        let mut table = PendingTable::default();
        let mut a = task::spawn(table.register(1));
        let mut b = task::spawn(table.register(2));

        let drained = table.take_all();
        assert!(table.is_empty());
        assert_eq!(drained.len(), 2);
        drained.reject_all();

        assert!(matches!(
            assert_ready!(a.poll()),
            Err(ClientError::ConnectionClosed)
        ));
        assert!(matches!(
            assert_ready!(b.poll()),
            Err(ClientError::ConnectionClosed)
        ));
    }

    #[test]
    fn dropped_table_fails_future() {
        let mut table = PendingTable::default();
        let mut fut = task::spawn(table.register(5));
        assert_eq!(fut.serial(), 5);
        drop(table);
        assert!(matches!(
            assert_ready!(fut.poll()),
            Err(ClientError::ConnectionClosed)
        ));
    }
}
