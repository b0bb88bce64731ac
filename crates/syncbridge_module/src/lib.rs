//! # syncbridge module
//!
//! The control surface a host application drives:
//!
//! - Log level control (`VERBOSE` .. `ASSERT`)
//! - Listener lifecycle with generated or explicit credentials
//! - Start, stop, suspend and resume of continuous replications
//! - Attachment upload with progress and attachment copy to disk
//! - The `replicationChanged` event stream
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use syncbridge_core::MemoryEngine;
//! use syncbridge_module::{BridgeConfig, InitOptions, MemoryListenerFactory, ReplicationRequest, SyncBridge};
//!
//! let engine = Arc::new(MemoryEngine::new());
//! engine.create_database("app");
//! let bridge = SyncBridge::new(engine, Arc::new(MemoryListenerFactory::new()), BridgeConfig::new())?;
//!
//! let init = bridge.init(InitOptions::default())?;
//! println!("listening on {}", init.listener_url);
//!
//! let events = bridge.subscribe();
//! bridge.start_continuous_replication(
//!     "app",
//!     "https://sync.example.com/app",
//!     ReplicationRequest::new("pull", "session-token"),
//! )?;
//! let event = events.recv()?;
//! println!("{}", serde_json::to_string(&event)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bridge;
mod error;
mod listener;
mod logging;

pub use bridge::{BridgeConfig, InitOptions, InitResponse, ReplicationRequest, SyncBridge};
pub use error::{ErrorKind, ErrorReport, ModuleError, ModuleResult};
pub use listener::{
    Credentials, ListenerConfig, ListenerFacade, ListenerFactory, ListenerSpec, ListenerState,
    LocalListener, MemoryListener, MemoryListenerFactory, ALL_INTERFACES, DEFAULT_LISTENER_PORT,
    LOCALHOST,
};
pub use logging::{LogControl, LogLevel};
