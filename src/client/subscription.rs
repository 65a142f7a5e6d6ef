//! Demand-driven subscriptions to state paths.
//!
//! A [`Subscription`] tracks the listeners interested in one path. The
//! first listener makes it active and sends `{"subscribe": path}`; removing
//! the last one makes it inactive, forgets the last state, and sends
//! `{"unsubscribe": path}`. Adding or removing listeners in between sends
//! nothing.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::OutboundMessage;

/// Send capability lent by the owning connection.
pub(crate) type SendFn = Arc<dyn Fn(&OutboundMessage) + Send + Sync>;

/// Listener invoked with every new state; `None` means unknown.
pub type UpdateListener = Arc<dyn Fn(Option<&Value>) + Send + Sync>;

/// Identifies a registered listener for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct SubscriptionState {
    listeners: Vec<(ListenerId, UpdateListener)>,
    last_state: Option<Value>,
}

struct SubscriptionInner {
    path: String,
    send: SendFn,
    state: Mutex<SubscriptionState>,
}

/// Handle to the subscription for one path.
///
/// Cheap to clone; every clone refers to the same subscription. Listener
/// callbacks run on whichever task delivered the update and must not
/// block.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    pub(crate) fn new(path: String, send: SendFn) -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                path,
                send,
                state: Mutex::new(SubscriptionState {
                    listeners: Vec::new(),
                    last_state: None,
                }),
            }),
        }
    }

    /// The subscribed path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Registers an update listener.
    ///
    /// Registering the first listener sends a subscribe control message.
    pub fn on_update<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        let id = ListenerId(Uuid::new_v4());
        let mut state = self.inner.state.lock();
        state.listeners.push((id, Arc::new(listener)));
        if state.listeners.len() == 1 {
            self.on_first_listener();
        }
        id
    }

    /// Deregisters a listener. Returns `false` if `id` was not registered.
    ///
    /// Removing the last listener resets the state to unknown and sends an
    /// unsubscribe control message.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.inner.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|(lid, _)| *lid != id);
        if state.listeners.len() == before {
            return false;
        }
        if state.listeners.is_empty() {
            self.on_last_listener_removed(&mut state);
        }
        true
    }

    /// Registers a listener that forwards updates to a [`Watcher`].
    pub fn watch(&self) -> Watcher {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.on_update(move |state| {
            let _ = tx.send(state.cloned());
        });
        Watcher {
            subscription: self.clone(),
            id,
            rx,
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.state.lock().listeners.len()
    }

    /// Returns `true` while at least one listener is registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.listener_count() > 0
    }

    /// Most recently pushed state, or `None` if unknown.
    #[must_use]
    pub fn state(&self) -> Option<Value> {
        self.inner.state.lock().last_state.clone()
    }

    /// Returns `true` if both handles refer to the same subscription.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stores `new_state` and notifies every listener.
    pub(crate) fn update(&self, new_state: Option<Value>) {
        let listeners = {
            let mut state = self.inner.state.lock();
            state.last_state.clone_from(&new_state);
            snapshot(&state)
        };
        notify(&listeners, new_state.as_ref());
    }

    /// Re-arms an active subscription on a fresh transport: the state
    /// becomes unknown and the subscribe message is sent again. Inactive
    /// subscriptions are left alone.
    pub(crate) fn replay(&self) {
        let listeners = {
            let mut state = self.inner.state.lock();
            if state.listeners.is_empty() {
                return;
            }
            state.last_state = None;
            self.on_first_listener();
            snapshot(&state)
        };
        notify(&listeners, None);
    }

    fn on_first_listener(&self) {
        tracing::debug!(path = %self.inner.path, "subscription active");
        (self.inner.send)(&OutboundMessage::subscribe(self.inner.path.as_str()));
    }

    fn on_last_listener_removed(&self, state: &mut SubscriptionState) {
        tracing::debug!(path = %self.inner.path, "subscription inactive");
        state.last_state = None;
        (self.inner.send)(&OutboundMessage::unsubscribe(self.inner.path.as_str()));
    }
}

fn snapshot(state: &SubscriptionState) -> Vec<UpdateListener> {
    state
        .listeners
        .iter()
        .map(|(_, listener)| Arc::clone(listener))
        .collect()
}

fn notify(listeners: &[UpdateListener], state: Option<&Value>) {
    for listener in listeners {
        listener(state);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Subscription")
            .field("path", &self.inner.path)
            .field("listeners", &state.listeners.len())
            .field("last_state", &state.last_state)
            .finish()
    }
}

/// Async view of a subscription's updates.
///
/// Holds one listener for as long as it lives; dropping the watcher
/// removes it.
#[derive(Debug)]
pub struct Watcher {
    subscription: Subscription,
    id: ListenerId,
    rx: mpsc::UnboundedReceiver<Option<Value>>,
}

impl Watcher {
    /// Waits for the next update. The inner `None` means the state became
    /// unknown (after a reconnect).
    pub async fn next(&mut self) -> Option<Option<Value>> {
        self.rx.recv().await
    }

    /// The watched subscription.
    #[must_use]
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.subscription.remove_listener(self.id);
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recording(path: &str) -> (Subscription, Arc<Mutex<Vec<OutboundMessage>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sent);
        let send: SendFn = Arc::new(move |msg: &OutboundMessage| sink.lock().push(msg.clone()));
        (Subscription::new(path.to_string(), send), sent)
    }

    #[test]
    fn first_listener_subscribes_once() {
        let (sub, sent) = recording("/a");
        let _l1 = sub.on_update(|_| {});
        let _l2 = sub.on_update(|_| {});
        assert_eq!(*sent.lock(), vec![OutboundMessage::subscribe("/a")]);
        assert_eq!(sub.listener_count(), 2);
    }

    #[test]
    fn last_listener_unsubscribes_and_resets_state() {
        let (sub, sent) = recording("/a");
        let l1 = sub.on_update(|_| {});
        let l2 = sub.on_update(|_| {});
        sub.update(Some(json!("X")));

        assert!(sub.remove_listener(l1));
        assert_eq!(sub.state(), Some(json!("X")));
        assert_eq!(sent.lock().len(), 1);

        assert!(sub.remove_listener(l2));
        assert_eq!(sub.state(), None);
        assert_eq!(
            *sent.lock(),
            vec![
                OutboundMessage::subscribe("/a"),
                OutboundMessage::unsubscribe("/a")
            ]
        );
        assert!(!sub.is_active());
    }

    #[test]
    fn removing_unknown_listener_is_noop() {
        let (sub, sent) = recording("/a");
        let id = sub.on_update(|_| {});
        assert!(sub.remove_listener(id));
        assert!(!sub.remove_listener(id));
        assert_eq!(sent.lock().len(), 2);
    }

    #[test]
    fn update_notifies_all_listeners() {
        let (sub, _sent) = recording("/a");
        let seen = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..2 {
            let seen = Arc::clone(&seen);
            sub.on_update(move |state| seen.lock().push(state.cloned()));
        }
        sub.update(Some(json!({"k": 1})));
        assert_eq!(*seen.lock(), vec![Some(json!({"k": 1})), Some(json!({"k": 1}))]);
        assert_eq!(sub.state(), Some(json!({"k": 1})));
    }

    #[test]
    fn replay_skips_inactive_subscription() {
        let (sub, sent) = recording("/a");
        sub.replay();
        assert!(sent.lock().is_empty());
    }

    #[test]
    fn replay_resends_and_clears_state() {
        let (sub, sent) = recording("/a");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = Arc::clone(&seen);
        sub.on_update(move |state| seen_in.lock().push(state.cloned()));
        sub.update(Some(json!(1)));

        sub.replay();
        assert_eq!(sub.state(), None);
        assert_eq!(
            *sent.lock(),
            vec![OutboundMessage::subscribe("/a"), OutboundMessage::subscribe("/a")]
        );
        assert_eq!(*seen.lock(), vec![Some(json!(1)), None]);
    }

    #[test]
    fn listener_may_remove_itself() {
        let (sub, sent) = recording("/a");
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let handle = sub.clone();
        let slot_in = Arc::clone(&slot);
        let id = sub.on_update(move |_| {
            if let Some(id) = *slot_in.lock() {
                handle.remove_listener(id);
            }
        });
        *slot.lock() = Some(id);

        sub.update(Some(json!(1)));
        assert_eq!(sub.listener_count(), 0);
        assert_eq!(sent.lock().len(), 2);
    }

    #[tokio::test]
    async fn watcher_yields_updates_and_unsubscribes_on_drop() {
        let (sub, sent) = recording("/w");
        let mut watcher = sub.watch();
        assert!(watcher.subscription().ptr_eq(&sub));

        sub.update(Some(json!("first")));
        sub.replay();
        assert_eq!(watcher.next().await, Some(Some(json!("first"))));
        assert_eq!(watcher.next().await, Some(None));

        drop(watcher);
        assert!(!sub.is_active());
        assert_eq!(sent.lock().last(), Some(&OutboundMessage::unsubscribe("/w")));
    }
}
