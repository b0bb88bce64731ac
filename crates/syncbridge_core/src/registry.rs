//! Deduplicated view over the engine's live replication lists.
//!
//! The registry never caches sessions. Every query re-reads the database's
//! replication list, and every mutation goes through the engine, so the view
//! cannot drift from what the engine is actually running.

use crate::config::ReplicationOptions;
use crate::engine::{DatabaseEngine, DatabaseHandle};
use crate::error::{ReplicationError, ReplicationResult, SessionFailure};
use crate::event::EventBus;
use crate::session::ReplicationSession;
use crate::types::{parse_remote_url, Direction};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tracks continuous replication sessions per database, direction and URL.
pub struct ReplicationRegistry {
    engine: Arc<dyn DatabaseEngine>,
    bus: Arc<EventBus>,
    // Held from lookup until the new session is running.
    start_lock: Mutex<()>,
}

impl ReplicationRegistry {
    /// Creates a registry over an engine, publishing to `bus`.
    pub fn new(engine: Arc<dyn DatabaseEngine>, bus: Arc<EventBus>) -> Self {
        Self {
            engine,
            bus,
            start_lock: Mutex::new(()),
        }
    }

    /// The event bus sessions are attached to.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The underlying engine.
    pub fn engine(&self) -> &Arc<dyn DatabaseEngine> {
        &self.engine
    }

    /// Returns the active continuous session for the identity triple, or
    /// creates a new one through the engine.
    ///
    /// The boolean is true if a session was created. The URL is validated
    /// before the engine is consulted. A created session sits in the engine's
    /// live list until it is started, so callers hold `start_lock`.
    pub(crate) fn find_or_create(
        &self,
        database: &str,
        direction: Direction,
        remote_url: &str,
    ) -> ReplicationResult<(Arc<ReplicationSession>, bool)> {
        let url = parse_remote_url(remote_url)?;
        let db = self.engine.database(database)?;

        let existing = db
            .all_replications()
            .into_iter()
            .find(|s| s.is_continuous() && s.key().matches(direction, &url));
        if let Some(session) = existing {
            return Ok((session, false));
        }

        let session = db.create_replication(direction, &url)?;
        debug!(session = %session.key(), "created replication");
        Ok((session, true))
    }

    /// Starts a continuous replication unless an identical one is active.
    ///
    /// Returns the session and whether this call started it. A request for an
    /// identity that is already replicating succeeds without doing anything.
    /// Concurrent starts are serialized, so an identity never gets two
    /// sessions; observers must not start replications from a callback.
    pub fn start_continuous(
        &self,
        database: &str,
        remote_url: &str,
        options: &ReplicationOptions,
    ) -> ReplicationResult<(Arc<ReplicationSession>, bool)> {
        options.validate()?;

        let _start = self.start_lock.lock();
        let (session, created) = self.find_or_create(database, options.direction, remote_url)?;
        if !created {
            info!(session = %session.key(), "replication already exists");
            return Ok((session, false));
        }

        let started = session.start(options.cookie(), &self.bus)?;
        Ok((session, started))
    }

    /// Lists continuous sessions of one direction.
    ///
    /// The returned sequence re-reads the engine's list every time it is
    /// iterated.
    pub fn list_continuous(
        &self,
        database: &str,
        direction: Direction,
    ) -> ReplicationResult<ContinuousSessions> {
        let database = self.engine.database(database)?;
        Ok(ContinuousSessions {
            database,
            direction,
        })
    }

    /// Stops and detaches every continuous session of one direction.
    ///
    /// Returns the number of sessions stopped.
    pub fn stop_all(&self, database: &str, direction: Direction) -> ReplicationResult<usize> {
        self.for_each_continuous(database, direction, "stop", |s| s.stop())
    }

    /// Suspends every running continuous session of one direction.
    pub fn suspend_all(&self, database: &str, direction: Direction) -> ReplicationResult<usize> {
        self.for_each_continuous(database, direction, "suspend", |s| s.suspend())
    }

    /// Resumes every suspended continuous session of one direction.
    pub fn resume_all(&self, database: &str, direction: Direction) -> ReplicationResult<usize> {
        self.for_each_continuous(database, direction, "resume", |s| s.resume())
    }

    // Attempts every matching session and reports all failures together.
    fn for_each_continuous<F>(
        &self,
        database: &str,
        direction: Direction,
        action: &str,
        op: F,
    ) -> ReplicationResult<usize>
    where
        F: Fn(&ReplicationSession) -> ReplicationResult<bool>,
    {
        let sessions = self.list_continuous(database, direction)?;

        let mut affected = 0;
        let mut failures = Vec::new();
        for session in &sessions {
            match op(session.as_ref()) {
                Ok(true) => affected += 1,
                Ok(false) => {}
                Err(error) => {
                    warn!(session = %session.key(), error = %error, "failed to {} replication", action);
                    failures.push(SessionFailure {
                        remote_url: session.remote_url().to_string(),
                        error,
                    });
                }
            }
        }

        info!(database, %direction, affected, failed = failures.len(), "{} continuous replications", action);
        if failures.is_empty() {
            Ok(affected)
        } else {
            Err(ReplicationError::SessionFailures(failures))
        }
    }
}

/// Continuous sessions of one direction on one database.
///
/// Iterating is lazy and may be repeated; each pass reflects the engine's
/// live list at that moment, in the engine's order.
pub struct ContinuousSessions {
    database: Arc<dyn DatabaseHandle>,
    direction: Direction,
}

impl ContinuousSessions {
    /// Starts a fresh pass over the live list.
    pub fn iter(&self) -> ContinuousIter {
        ContinuousIter {
            inner: self.database.all_replications().into_iter(),
            direction: self.direction,
        }
    }

    /// Database name.
    pub fn database(&self) -> &str {
        self.database.name()
    }

    /// Direction filter.
    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl<'a> IntoIterator for &'a ContinuousSessions {
    type Item = Arc<ReplicationSession>;
    type IntoIter = ContinuousIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over one pass of [`ContinuousSessions`].
pub struct ContinuousIter {
    inner: std::vec::IntoIter<Arc<ReplicationSession>>,
    direction: Direction,
}

impl Iterator for ContinuousIter {
    type Item = Arc<ReplicationSession>;

    fn next(&mut self) -> Option<Self::Item> {
        let direction = self.direction;
        self.inner
            .by_ref()
            .find(|s| s.is_continuous() && s.direction() == direction)
    }
}
