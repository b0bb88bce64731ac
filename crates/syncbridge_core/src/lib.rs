//! # syncbridge core
//!
//! Continuous replication session manager for an embedded document database.
//!
//! This crate provides:
//! - Replication session state machine (stopped → starting → running ⇄ suspended)
//! - A registry that deduplicates sessions per database, direction and remote URL
//! - An event bus relaying session status changes to observers
//! - Engine interfaces and an in-memory engine
//!
//! ## Architecture
//!
//! The database engine owns the sessions and the sync transport. The registry
//! is a view over the engine's live replication lists and never keeps a copy:
//!
//! ```text
//! caller ──► ReplicationRegistry ──► DatabaseEngine ──► DatabaseHandle
//!                  │                                        │
//!                  ▼                                        ▼
//!           ReplicationSession ◄──── record_status ──── Replicator
//!                  │
//!                  ▼
//!              EventBus ──► observers
//! ```
//!
//! ## Key Invariants
//!
//! - At most one active continuous session per (database, direction, URL)
//! - Registry queries always re-read the engine's live list
//! - Input is validated before any session is created or changed
//! - A stopped session is detached before its traffic halts, so observers
//!   never see an event from a session after its stop returns

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod event;
mod memory;
mod registry;
mod session;
mod types;

pub use config::{ReplicationOptions, ReplicatorConfig, SessionCookie, DEFAULT_COOKIE_NAME};
pub use engine::{DatabaseEngine, DatabaseHandle, Replicator};
pub use error::{ReplicationError, ReplicationResult, SessionFailure};
pub use event::{
    EventBus, ObserverError, ObserverId, ReplicationChangeEvent, ReplicationObserver,
    REPLICATION_CHANGED_EVENT,
};
pub use memory::{MemoryDatabase, MemoryEngine, MemoryReplicator, ReplicatorCall};
pub use registry::{ContinuousIter, ContinuousSessions, ReplicationRegistry};
pub use session::{ReplicationSession, SessionState, TransportStatus};
pub use types::{parse_remote_url, same_endpoint, Direction, SessionKey};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
