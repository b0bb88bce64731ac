//! In-memory engine for tests and embedding without a storage backend.

use crate::config::ReplicatorConfig;
use crate::engine::{DatabaseEngine, DatabaseHandle, Replicator};
use crate::error::{ReplicationError, ReplicationResult};
use crate::session::ReplicationSession;
use crate::types::{Direction, SessionKey};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// A call received by a [`MemoryReplicator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicatorCall {
    /// `start` with its configuration.
    Start(ReplicatorConfig),
    /// `stop`.
    Stop,
    /// `go_offline`.
    GoOffline,
    /// `go_online`.
    GoOnline,
}

/// A replicator that records calls and can be told to fail.
#[derive(Debug, Default)]
pub struct MemoryReplicator {
    calls: Mutex<Vec<ReplicatorCall>>,
    online: AtomicBool,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    start_delay: Mutex<Duration>,
}

impl MemoryReplicator {
    /// Creates a replicator that succeeds at everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls received so far.
    pub fn calls(&self) -> Vec<ReplicatorCall> {
        self.calls.lock().clone()
    }

    /// Whether traffic is currently flowing.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Makes `start` fail.
    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Makes `stop` fail.
    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Makes `start` block for `delay` before returning.
    pub fn set_start_delay(&self, delay: Duration) {
        *self.start_delay.lock() = delay;
    }

    fn record(&self, call: ReplicatorCall) {
        self.calls.lock().push(call);
    }
}

impl Replicator for MemoryReplicator {
    fn start(&self, config: &ReplicatorConfig) -> ReplicationResult<()> {
        self.record(ReplicatorCall::Start(config.clone()));
        let delay = *self.start_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ReplicationError::transport_fatal("simulated start failure"));
        }
        self.online.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> ReplicationResult<()> {
        self.record(ReplicatorCall::Stop);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(ReplicationError::transport_retryable("simulated stop failure"));
        }
        self.online.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn go_offline(&self) -> ReplicationResult<()> {
        self.record(ReplicatorCall::GoOffline);
        self.online.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn go_online(&self) -> ReplicationResult<()> {
        self.record(ReplicatorCall::GoOnline);
        self.online.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct Replication {
    session: Arc<ReplicationSession>,
    replicator: Arc<MemoryReplicator>,
}

/// An in-memory database with a replication list and attachment store.
pub struct MemoryDatabase {
    name: String,
    replications: RwLock<Vec<Replication>>,
    attachments: RwLock<HashMap<(String, String), Vec<u8>>>,
    fail_starts: AtomicBool,
    start_delay: Mutex<Duration>,
}

impl MemoryDatabase {
    /// Creates an empty database.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            replications: RwLock::new(Vec::new()),
            attachments: RwLock::new(HashMap::new()),
            fail_starts: AtomicBool::new(false),
            start_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Stores an attachment on a document.
    pub fn put_attachment(&self, document_id: &str, name: &str, content: impl Into<Vec<u8>>) {
        self.attachments
            .write()
            .insert((document_id.to_string(), name.to_string()), content.into());
    }

    /// Makes replicators created from now on fail to start.
    pub fn set_fail_starts(&self, fail: bool) {
        self.fail_starts.store(fail, Ordering::SeqCst);
    }

    /// Makes replicators created from now on take `delay` to start.
    pub fn set_start_delay(&self, delay: Duration) {
        *self.start_delay.lock() = delay;
    }

    /// The replicator behind a session.
    pub fn replicator(&self, session_id: Uuid) -> Option<Arc<MemoryReplicator>> {
        self.replications
            .read()
            .iter()
            .find(|r| r.session.id() == session_id)
            .map(|r| Arc::clone(&r.replicator))
    }

    /// Number of sessions in the live list.
    pub fn replication_count(&self) -> usize {
        self.all_replications().len()
    }
}

impl DatabaseHandle for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn all_replications(&self) -> Vec<Arc<ReplicationSession>> {
        let mut replications = self.replications.write();
        replications.retain(|r| !r.session.is_retired());
        replications.iter().map(|r| Arc::clone(&r.session)).collect()
    }

    fn create_replication(
        &self,
        direction: Direction,
        remote_url: &Url,
    ) -> ReplicationResult<Arc<ReplicationSession>> {
        let replicator = Arc::new(MemoryReplicator::new());
        replicator.set_fail_start(self.fail_starts.load(Ordering::SeqCst));
        replicator.set_start_delay(*self.start_delay.lock());

        let key = SessionKey::new(self.name.clone(), direction, remote_url.clone());
        let session = Arc::new(ReplicationSession::new(key, replicator.clone()));

        self.replications.write().push(Replication {
            session: Arc::clone(&session),
            replicator,
        });
        Ok(session)
    }

    fn open_attachment(
        &self,
        document_id: &str,
        attachment_name: &str,
    ) -> ReplicationResult<Option<Box<dyn Read + Send>>> {
        let content = self
            .attachments
            .read()
            .get(&(document_id.to_string(), attachment_name.to_string()))
            .cloned();
        Ok(content.map(|bytes| Box::new(Cursor::new(bytes)) as Box<dyn Read + Send>))
    }
}

/// An in-memory engine holding [`MemoryDatabase`]s.
#[derive(Default)]
pub struct MemoryEngine {
    databases: RwLock<HashMap<String, Arc<MemoryDatabase>>>,
}

impl MemoryEngine {
    /// Creates an engine with no databases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the named database, creating it if needed.
    pub fn create_database(&self, name: &str) -> Arc<MemoryDatabase> {
        Arc::clone(
            self.databases
                .write()
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryDatabase::new(name))),
        )
    }

    /// Returns the named database.
    pub fn get(&self, name: &str) -> Option<Arc<MemoryDatabase>> {
        self.databases.read().get(name).cloned()
    }
}

impl DatabaseEngine for MemoryEngine {
    fn database(&self, name: &str) -> ReplicationResult<Arc<dyn DatabaseHandle>> {
        self.get(name)
            .map(|db| db as Arc<dyn DatabaseHandle>)
            .ok_or_else(|| ReplicationError::DatabaseNotFound {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionCookie;
    use crate::event::EventBus;

    fn url() -> Url {
        Url::parse("https://sync.example.com/app").unwrap()
    }

    #[test]
    fn engine_databases() {
        let engine = MemoryEngine::new();
        let db = engine.create_database("app");
        let again = engine.create_database("app");
        assert!(Arc::ptr_eq(&db, &again));

        assert_eq!(engine.database("app").unwrap().name(), "app");
        assert!(matches!(
            engine.database("other"),
            Err(ReplicationError::DatabaseNotFound { .. })
        ));
    }

    #[test]
    fn stopped_sessions_leave_live_list() {
        let db = MemoryDatabase::new("app");
        let bus = Arc::new(EventBus::new());
        let session = db.create_replication(Direction::Pull, &url()).unwrap();
        assert_eq!(db.replication_count(), 1);

        let cookie = SessionCookie {
            name: "c".into(),
            value: "v".into(),
            domain: None,
            path: None,
            secure: false,
            http_only: true,
        };
        session.start(cookie, &bus).unwrap();
        assert_eq!(db.replication_count(), 1);

        session.stop().unwrap();
        assert_eq!(db.replication_count(), 0);
        assert!(db.replicator(session.id()).is_none());
    }

    #[test]
    fn attachment_lookup() {
        let db = MemoryDatabase::new("app");
        db.put_attachment("doc1", "photo.jpg", vec![1, 2, 3]);

        let mut reader = db.open_attachment("doc1", "photo.jpg").unwrap().unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).unwrap();
        assert_eq!(content, vec![1, 2, 3]);

        assert!(db.open_attachment("doc1", "missing").unwrap().is_none());
        assert!(db.open_attachment("doc2", "photo.jpg").unwrap().is_none());
    }

    #[test]
    fn replicator_records_calls() {
        let replicator = MemoryReplicator::new();
        replicator.go_offline().unwrap();
        replicator.go_online().unwrap();
        replicator.stop().unwrap();

        assert_eq!(
            replicator.calls(),
            vec![
                ReplicatorCall::GoOffline,
                ReplicatorCall::GoOnline,
                ReplicatorCall::Stop
            ]
        );
        assert!(!replicator.is_online());
    }
}
