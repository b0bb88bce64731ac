//! Replication status events and their fan-out.
//!
//! Sessions publish a [`ReplicationChangeEvent`] on every status change. The
//! [`EventBus`] relays each event to the registered observers and channel
//! subscribers, in publish order, and only for sessions currently attached.
//!
//! # Usage
//!
//! ```rust,ignore
//! let bus = EventBus::new();
//! let receiver = bus.subscribe();
//!
//! std::thread::spawn(move || {
//!     while let Ok(event) = receiver.recv() {
//!         println!("{}: {} of {}", event.state, event.completed_change_count, event.change_count);
//!     }
//! });
//! ```

use crate::session::SessionState;
use crate::types::Direction;
use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use tracing::{trace, warn};
use uuid::Uuid;

/// Name of the outbound event carrying a [`ReplicationChangeEvent`].
pub const REPLICATION_CHANGED_EVENT: &str = "replicationChanged";

/// A snapshot of a session's status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationChangeEvent {
    /// Session instance that produced the event.
    #[serde(skip)]
    pub session_id: Uuid,
    /// Local database name.
    pub database: String,
    /// Remote endpoint.
    pub remote_url: String,
    /// Replication direction.
    #[serde(rename = "type")]
    pub direction: Direction,
    /// Total changes discovered.
    #[serde(rename = "changesCount")]
    pub change_count: u64,
    /// Changes applied.
    #[serde(rename = "completedChangesCount")]
    pub completed_change_count: u64,
    /// Whether the session is running.
    pub running: bool,
    /// Session state.
    #[serde(rename = "status")]
    pub state: SessionState,
    /// Whether the session is suspended.
    pub suspended: bool,
    /// Most recent transport error.
    #[serde(rename = "lastErrorCode", serialize_with = "empty_if_none")]
    pub last_error: Option<String>,
}

fn empty_if_none<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(value.as_deref().unwrap_or(""))
}

/// Error type observers may return. It is logged and otherwise ignored.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Receives replication change events.
pub trait ReplicationObserver: Send + Sync {
    /// Called synchronously for every published event.
    fn replication_changed(&self, event: &ReplicationChangeEvent) -> Result<(), ObserverError>;
}

impl<F> ReplicationObserver for F
where
    F: Fn(&ReplicationChangeEvent) -> Result<(), ObserverError> + Send + Sync,
{
    fn replication_changed(&self, event: &ReplicationChangeEvent) -> Result<(), ObserverError> {
        self(event)
    }
}

/// Handle returned by [`EventBus::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Fan-out of replication change events.
///
/// A failing or panicking observer does not prevent delivery to the others.
pub struct EventBus {
    observers: RwLock<Vec<(ObserverId, Arc<dyn ReplicationObserver>)>>,
    subscribers: RwLock<Vec<Sender<ReplicationChangeEvent>>>,
    attached: RwLock<HashSet<Uuid>>,
    next_observer: AtomicU64,
    published: AtomicU64,
}

impl EventBus {
    /// Creates an empty event bus.
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
            subscribers: RwLock::new(Vec::new()),
            attached: RwLock::new(HashSet::new()),
            next_observer: AtomicU64::new(1),
            published: AtomicU64::new(0),
        }
    }

    /// Registers an observer.
    pub fn register(&self, observer: Arc<dyn ReplicationObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::SeqCst));
        self.observers.write().push((id, observer));
        id
    }

    /// Removes an observer. Returns false if it was not registered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Subscribes to all future events through a channel.
    ///
    /// Dropping the receiver unsubscribes on the next publish.
    pub fn subscribe(&self) -> Receiver<ReplicationChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Attaches a session. Returns false if it was already attached.
    pub fn attach(&self, session_id: Uuid) -> bool {
        self.attached.write().insert(session_id)
    }

    /// Detaches a session. Returns false if it was not attached.
    pub fn detach(&self, session_id: Uuid) -> bool {
        self.attached.write().remove(&session_id)
    }

    /// Whether a session is attached.
    pub fn is_attached(&self, session_id: Uuid) -> bool {
        self.attached.read().contains(&session_id)
    }

    /// Number of attached sessions.
    pub fn attached_count(&self) -> usize {
        self.attached.read().len()
    }

    /// Number of registered observers (channel subscribers excluded).
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Number of events published so far.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    /// Delivers an event to every observer and subscriber.
    ///
    /// Events from sessions that are not attached are dropped. Returns the
    /// number of successful deliveries.
    pub fn publish(&self, event: &ReplicationChangeEvent) -> usize {
        if !self.is_attached(event.session_id) {
            trace!(session = %event.session_id, "dropping event from detached session");
            return 0;
        }
        self.published.fetch_add(1, Ordering::SeqCst);

        // Snapshot so observers may register or unregister while being called.
        let observers: Vec<_> = self
            .observers
            .read()
            .iter()
            .map(|(id, observer)| (*id, Arc::clone(observer)))
            .collect();

        let mut delivered = 0;
        for (id, observer) in observers {
            match panic::catch_unwind(AssertUnwindSafe(|| observer.replication_changed(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!(observer = id.0, error = %e, "replication observer failed"),
                Err(_) => warn!(observer = id.0, "replication observer panicked"),
            }
        }

        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| {
            let sent = tx.send(event.clone()).is_ok();
            if sent {
                delivered += 1;
            }
            sent
        });

        delivered
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn event(session_id: Uuid, change_count: u64) -> ReplicationChangeEvent {
        ReplicationChangeEvent {
            session_id,
            database: "app".into(),
            remote_url: "https://sync.example.com/app".into(),
            direction: Direction::Push,
            change_count,
            completed_change_count: 0,
            running: true,
            state: SessionState::Running,
            suspended: false,
            last_error: None,
        }
    }

    #[test]
    fn emit_and_receive() {
        let bus = EventBus::new();
        let session = Uuid::new_v4();
        bus.attach(session);
        let rx = bus.subscribe();

        let sent = event(session, 1);
        assert_eq!(bus.publish(&sent), 1);
        assert_eq!(rx.recv_timeout(Duration::from_millis(100)).unwrap(), sent);
    }

    #[test]
    fn detached_sessions_are_silent() {
        let bus = EventBus::new();
        let session = Uuid::new_v4();
        let rx = bus.subscribe();

        assert_eq!(bus.publish(&event(session, 1)), 0);
        assert!(rx.try_recv().is_err());

        bus.attach(session);
        bus.detach(session);
        assert_eq!(bus.publish(&event(session, 2)), 0);
        assert_eq!(bus.published_count(), 0);
    }

    #[test]
    fn attach_is_idempotent() {
        let bus = EventBus::new();
        let session = Uuid::new_v4();
        assert!(bus.attach(session));
        assert!(!bus.attach(session));
        assert_eq!(bus.attached_count(), 1);
        assert!(bus.detach(session));
        assert!(!bus.detach(session));
    }

    #[test]
    fn failing_observer_is_isolated() {
        let bus = EventBus::new();
        let session = Uuid::new_v4();
        bus.attach(session);

        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.register(Arc::new(|_: &ReplicationChangeEvent| -> Result<(), ObserverError> {
            Err("observer exploded".into())
        }));
        bus.register(Arc::new(|_: &ReplicationChangeEvent| -> Result<(), ObserverError> {
            panic!("observer panicked")
        }));
        let sink = Arc::clone(&seen);
        bus.register(Arc::new(move |e: &ReplicationChangeEvent| -> Result<(), ObserverError> {
            sink.lock().push(e.change_count);
            Ok(())
        }));

        assert_eq!(bus.publish(&event(session, 1)), 1);
        assert_eq!(bus.publish(&event(session, 2)), 1);
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn unregister_stops_delivery() {
        let bus = EventBus::new();
        let session = Uuid::new_v4();
        bus.attach(session);

        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let id = bus.register(Arc::new(move |_: &ReplicationChangeEvent| -> Result<(), ObserverError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        bus.publish(&event(session, 1));
        assert!(bus.unregister(id));
        assert!(!bus.unregister(id));
        bus.publish(&event(session, 2));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.observer_count(), 0);
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let bus = EventBus::new();
        let session = Uuid::new_v4();
        bus.attach(session);

        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();
        drop(rx2);

        assert_eq!(bus.publish(&event(session, 1)), 1);
        assert_eq!(bus.subscribers.read().len(), 1);
        assert_eq!(rx1.recv().unwrap().change_count, 1);
    }

    #[test]
    fn wire_shape() {
        let mut e = event(Uuid::new_v4(), 5);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "push");
        assert_eq!(json["changesCount"], 5);
        assert_eq!(json["completedChangesCount"], 0);
        assert_eq!(json["status"], "Running");
        assert_eq!(json["running"], true);
        assert_eq!(json["suspended"], false);
        assert_eq!(json["lastErrorCode"], "");
        assert_eq!(json["remoteUrl"], "https://sync.example.com/app");
        assert!(json.get("sessionId").is_none());

        e.last_error = Some("timeout".into());
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["lastErrorCode"], "timeout");
    }
}
