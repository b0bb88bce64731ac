//! Replication session state machine.
//!
//! ```text
//! Stopped ──start──► Starting ──► Running ◄──resume── Suspended
//!    ▲                               │  └───suspend───────►│
//!    └──────────────stop─────────────┴─────────────────────┘
//! ```
//!
//! A stopped session is retired: the engine drops it from its live list and a
//! later request for the same identity creates a fresh session.

use crate::config::{ReplicatorConfig, SessionCookie};
use crate::engine::Replicator;
use crate::error::{ReplicationError, ReplicationResult};
use crate::event::{EventBus, ReplicationChangeEvent};
use crate::types::{Direction, SessionKey};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// The lifecycle state of a replication session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// Not syncing. Initial and terminal state.
    Stopped,
    /// The engine's sync transport is being started.
    Starting,
    /// Syncing.
    Running,
    /// Traffic paused; cookie and counters are kept.
    Suspended,
}

impl SessionState {
    /// Returns the state name used in change events.
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Stopped => "Stopped",
            SessionState::Starting => "Starting",
            SessionState::Running => "Running",
            SessionState::Suspended => "Suspended",
        }
    }

    /// Returns true while the session holds an open replication.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Running | SessionState::Suspended)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A status report from the engine's sync transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStatus {
    /// Total changes discovered so far.
    pub change_count: u64,
    /// Changes applied so far.
    pub completed_change_count: u64,
    /// Most recent transport error, if any.
    pub error: Option<String>,
}

impl TransportStatus {
    /// Creates a progress report with no error.
    pub fn progress(change_count: u64, completed_change_count: u64) -> Self {
        Self {
            change_count,
            completed_change_count,
            error: None,
        }
    }

    /// Attaches an error message to the report.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

struct SessionInner {
    state: SessionState,
    continuous: bool,
    cookie: Option<SessionCookie>,
    change_count: u64,
    completed_change_count: u64,
    last_error: Option<String>,
    bus: Option<Arc<EventBus>>,
    retired: bool,
}

/// A single push or pull replication bound to one database and one remote URL.
///
/// Control calls and event publication are serialized by a per-session lock,
/// so events for one session reach observers in the order the state changed
/// and none is delivered once [`stop`](Self::stop) has returned. Observers
/// must not call control methods on the session that published the event.
pub struct ReplicationSession {
    id: Uuid,
    key: SessionKey,
    replicator: Arc<dyn Replicator>,
    transition: Mutex<()>,
    inner: RwLock<SessionInner>,
}

impl ReplicationSession {
    /// Creates a stopped, non-continuous session over the engine's replicator.
    pub fn new(key: SessionKey, replicator: Arc<dyn Replicator>) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            replicator,
            transition: Mutex::new(()),
            inner: RwLock::new(SessionInner {
                state: SessionState::Stopped,
                continuous: false,
                cookie: None,
                change_count: 0,
                completed_change_count: 0,
                last_error: None,
                bus: None,
                retired: false,
            }),
        }
    }

    /// Unique id of this session instance.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The session's identity triple.
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Local database name.
    pub fn database(&self) -> &str {
        &self.key.database
    }

    /// Replication direction.
    pub fn direction(&self) -> Direction {
        self.key.direction
    }

    /// Remote endpoint.
    pub fn remote_url(&self) -> &Url {
        &self.key.remote_url
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.inner.read().state
    }

    /// Whether the session was started as a continuous replication.
    pub fn is_continuous(&self) -> bool {
        self.inner.read().continuous
    }

    /// The cookie attached when the session started.
    pub fn cookie(&self) -> Option<SessionCookie> {
        self.inner.read().cookie.clone()
    }

    /// Total changes discovered.
    pub fn change_count(&self) -> u64 {
        self.inner.read().change_count
    }

    /// Changes applied.
    pub fn completed_change_count(&self) -> u64 {
        self.inner.read().completed_change_count
    }

    /// Most recent transport error.
    pub fn last_error(&self) -> Option<String> {
        self.inner.read().last_error.clone()
    }

    /// Whether the session currently publishes to an event bus.
    pub fn is_attached(&self) -> bool {
        self.inner.read().bus.is_some()
    }

    /// Whether the session was stopped and should be dropped by the engine.
    pub fn is_retired(&self) -> bool {
        self.inner.read().retired
    }

    /// Starts continuous replication.
    ///
    /// Attaches the cookie, hands off to the engine's sync transport and
    /// registers with `bus`. Returns `Ok(false)` without side effects when the
    /// session is already running or suspended.
    pub fn start(&self, cookie: SessionCookie, bus: &Arc<EventBus>) -> ReplicationResult<bool> {
        let _transition = self.transition.lock();

        {
            let mut inner = self.inner.write();
            match inner.state {
                SessionState::Running | SessionState::Suspended => {
                    debug!(session = %self.key, "replication already started");
                    return Ok(false);
                }
                SessionState::Stopped if inner.retired => {
                    return Err(ReplicationError::InvalidStateTransition {
                        from: "Stopped (retired)".into(),
                        to: SessionState::Running.to_string(),
                    });
                }
                SessionState::Stopped | SessionState::Starting => {
                    inner.state = SessionState::Starting;
                }
            }
        }

        let config = ReplicatorConfig {
            continuous: true,
            cookie: cookie.clone(),
        };
        if let Err(e) = self.replicator.start(&config) {
            warn!(session = %self.key, error = %e, "failed to start replication");
            let mut inner = self.inner.write();
            inner.state = SessionState::Stopped;
            inner.retired = true;
            inner.last_error = Some(e.to_string());
            return Err(e);
        }

        {
            let mut inner = self.inner.write();
            inner.state = SessionState::Running;
            inner.continuous = true;
            inner.cookie = Some(cookie);
            inner.bus = Some(Arc::clone(bus));
        }
        bus.attach(self.id);
        info!(session = %self.key, "replication started");

        self.publish_current();
        Ok(true)
    }

    /// Stops the session.
    ///
    /// Detaches from the event bus before halting traffic. Returns `Ok(false)`
    /// if the session was not active. If the transport fails to stop, the
    /// session is attached again and keeps its state so the stop can be
    /// retried.
    pub fn stop(&self) -> ReplicationResult<bool> {
        let _transition = self.transition.lock();

        let bus = {
            let mut inner = self.inner.write();
            if inner.state == SessionState::Stopped {
                return Ok(false);
            }
            inner.bus.take()
        };
        if let Some(bus) = &bus {
            bus.detach(self.id);
        }

        if let Err(e) = self.replicator.stop() {
            warn!(session = %self.key, error = %e, "failed to stop replication");
            if let Some(bus) = bus {
                bus.attach(self.id);
                self.inner.write().bus = Some(bus);
            }
            return Err(e);
        }

        let mut inner = self.inner.write();
        inner.state = SessionState::Stopped;
        inner.retired = true;
        info!(session = %self.key, "replication stopped");
        Ok(true)
    }

    /// Pauses sync traffic. A no-op unless the session is running.
    pub fn suspend(&self) -> ReplicationResult<bool> {
        self.toggle_traffic(SessionState::Running, SessionState::Suspended)
    }

    /// Re-establishes sync traffic. A no-op unless the session is suspended.
    pub fn resume(&self) -> ReplicationResult<bool> {
        self.toggle_traffic(SessionState::Suspended, SessionState::Running)
    }

    fn toggle_traffic(&self, from: SessionState, to: SessionState) -> ReplicationResult<bool> {
        let _transition = self.transition.lock();

        if self.state() != from {
            debug!(session = %self.key, state = %self.state(), "no active replication to {}", to);
            return Ok(false);
        }

        match to {
            SessionState::Suspended => self.replicator.go_offline()?,
            _ => self.replicator.go_online()?,
        }
        self.inner.write().state = to;
        info!(session = %self.key, "replication {}", to.name().to_lowercase());

        self.publish_current();
        Ok(true)
    }

    /// Records a status report from the sync transport and publishes it.
    ///
    /// Errors are kept on the session without changing its state; continuous
    /// sessions are expected to recover through the transport's own retry.
    pub fn record_status(&self, status: TransportStatus) {
        let _transition = self.transition.lock();

        {
            let mut inner = self.inner.write();
            inner.change_count = status.change_count;
            inner.completed_change_count = status.completed_change_count;
            if let Some(error) = &status.error {
                debug!(session = %self.key, error = %error, "replication transport error");
            }
            inner.last_error = status.error;
        }

        self.publish_current();
    }

    /// Builds an event from the current state.
    pub fn snapshot(&self) -> ReplicationChangeEvent {
        let inner = self.inner.read();
        ReplicationChangeEvent {
            session_id: self.id,
            database: self.key.database.clone(),
            remote_url: self.key.remote_url.to_string(),
            direction: self.key.direction,
            change_count: inner.change_count,
            completed_change_count: inner.completed_change_count,
            running: inner.state == SessionState::Running,
            state: inner.state,
            suspended: inner.state == SessionState::Suspended,
            last_error: inner.last_error.clone(),
        }
    }

    // Caller holds the transition lock.
    fn publish_current(&self) {
        let bus = self.inner.read().bus.clone();
        match bus {
            Some(bus) => {
                bus.publish(&self.snapshot());
            }
            None => debug!(session = %self.key, "status change on detached session dropped"),
        }
    }
}

impl fmt::Debug for ReplicationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicationSession")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("state", &self.state())
            .field("continuous", &self.is_continuous())
            .finish()
    }
}
