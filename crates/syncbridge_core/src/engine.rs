//! Interfaces to the embedded database engine.
//!
//! The engine owns named databases, their replication lists and the sync
//! transport that actually moves documents. This crate only drives them.

use crate::config::ReplicatorConfig;
use crate::error::ReplicationResult;
use crate::session::ReplicationSession;
use crate::types::Direction;
use std::io::Read;
use std::sync::Arc;
use url::Url;

/// The engine's sync transport for one replication.
///
/// Calls must return promptly; network work happens on the engine's own
/// schedule and is reported back through
/// [`ReplicationSession::record_status`].
pub trait Replicator: Send + Sync {
    /// Begins syncing with the given cookie attached to every request.
    fn start(&self, config: &ReplicatorConfig) -> ReplicationResult<()>;

    /// Halts sync traffic for good.
    fn stop(&self) -> ReplicationResult<()>;

    /// Pauses sync traffic, keeping checkpoints and auth state.
    fn go_offline(&self) -> ReplicationResult<()>;

    /// Resumes sync traffic after [`go_offline`](Self::go_offline).
    fn go_online(&self) -> ReplicationResult<()>;
}

/// A named database owned by the engine.
pub trait DatabaseHandle: Send + Sync {
    /// Database name.
    fn name(&self) -> &str;

    /// The live replication list, in creation order.
    ///
    /// Stopped sessions are no longer part of it.
    fn all_replications(&self) -> Vec<Arc<ReplicationSession>>;

    /// Creates a new, not yet started replication and adds it to the live list.
    fn create_replication(
        &self,
        direction: Direction,
        remote_url: &Url,
    ) -> ReplicationResult<Arc<ReplicationSession>>;

    /// Opens an attachment of the current revision of a document.
    ///
    /// Returns `Ok(None)` if the document or the attachment does not exist.
    fn open_attachment(
        &self,
        document_id: &str,
        attachment_name: &str,
    ) -> ReplicationResult<Option<Box<dyn Read + Send>>>;
}

/// The embedded database engine.
pub trait DatabaseEngine: Send + Sync {
    /// Looks up a database by name.
    ///
    /// Fails with [`ReplicationError::DatabaseNotFound`](crate::ReplicationError::DatabaseNotFound)
    /// for unknown names.
    fn database(&self, name: &str) -> ReplicationResult<Arc<dyn DatabaseHandle>>;
}
