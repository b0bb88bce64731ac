//! Simulate command implementation.

use std::sync::Arc;
use syncbridge_core::{MemoryEngine, ReplicationChangeEvent, TransportStatus};
use syncbridge_module::{BridgeConfig, MemoryListenerFactory, ReplicationRequest, SyncBridge};
use tracing::info;

/// Runs a start, progress, suspend, resume, stop cycle and prints every
/// `replicationChanged` event as a JSON line.
pub fn run(
    database: &str,
    remote: &str,
    kind: &str,
    session_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Arc::new(MemoryEngine::new());
    engine.create_database(database);
    let bridge = SyncBridge::new(
        engine,
        Arc::new(MemoryListenerFactory::new()),
        BridgeConfig::new(),
    )?;
    let events = bridge.subscribe();
    info!(database, remote, kind, "simulating continuous replication");

    bridge.start_continuous_replication(
        database,
        remote,
        ReplicationRequest::new(kind, session_id),
    )?;

    let direction = kind.parse()?;
    for session in &bridge.registry().list_continuous(database, direction)? {
        session.record_status(TransportStatus::progress(10, 4));
        session.record_status(TransportStatus::progress(10, 10));
    }

    bridge.suspend_continuous_replications(database, kind)?;
    bridge.resume_continuous_replications(database, kind)?;
    let stopped = bridge.stop_continuous_replication(database, kind)?;
    info!(stopped, "simulation finished");

    let events: Vec<ReplicationChangeEvent> = events.try_iter().collect();
    for event in &events {
        println!("{}", serde_json::to_string(event)?);
    }
    println!();
    println!("Events: {}", events.len());
    println!("Sessions stopped: {stopped}");

    Ok(())
}
