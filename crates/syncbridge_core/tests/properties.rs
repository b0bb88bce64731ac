//! Property tests for registry deduplication.

use proptest::prelude::*;
use std::sync::Arc;
use syncbridge_core::{
    Direction, EventBus, MemoryEngine, ReplicationOptions, ReplicationRegistry, SessionState,
};

const REMOTES: [&str; 3] = [
    "https://a.example.com/app",
    "https://b.example.com/app",
    "https://b.example.com/app?filter=mine",
];

#[derive(Debug, Clone)]
enum Command {
    Start(Direction, usize),
    Stop(Direction),
    Suspend(Direction),
    Resume(Direction),
}

fn direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Push), Just(Direction::Pull)]
}

fn command() -> impl Strategy<Value = Command> {
    prop_oneof![
        4 => (direction(), 0..REMOTES.len()).prop_map(|(d, r)| Command::Start(d, r)),
        1 => direction().prop_map(Command::Stop),
        1 => direction().prop_map(Command::Suspend),
        1 => direction().prop_map(Command::Resume),
    ]
}

proptest! {
    #[test]
    fn at_most_one_active_session_per_identity(commands in prop::collection::vec(command(), 1..40)) {
        let engine = Arc::new(MemoryEngine::new());
        engine.create_database("app");
        let registry = ReplicationRegistry::new(engine.clone(), Arc::new(EventBus::new()));

        for command in commands {
            match command {
                Command::Start(d, r) => {
                    registry
                        .start_continuous("app", REMOTES[r], &ReplicationOptions::new(d, "t"))
                        .unwrap();
                }
                Command::Stop(d) => { registry.stop_all("app", d).unwrap(); }
                Command::Suspend(d) => { registry.suspend_all("app", d).unwrap(); }
                Command::Resume(d) => { registry.resume_all("app", d).unwrap(); }
            }

            for d in [Direction::Push, Direction::Pull] {
                let sessions: Vec<_> = registry.list_continuous("app", d).unwrap().iter().collect();
                for (i, a) in sessions.iter().enumerate() {
                    prop_assert!(a.state().is_active());
                    for b in &sessions[i + 1..] {
                        prop_assert!(!b.key().matches(d, a.remote_url()));
                    }
                }
            }
        }

        // Every live session is attached exactly once.
        let live = engine.get("app").unwrap().replication_count();
        prop_assert_eq!(registry.bus().attached_count(), live);
    }

    #[test]
    fn stop_all_leaves_no_session_of_that_direction(starts in prop::collection::vec((direction(), 0..REMOTES.len()), 0..12)) {
        let engine = Arc::new(MemoryEngine::new());
        engine.create_database("app");
        let registry = ReplicationRegistry::new(engine.clone(), Arc::new(EventBus::new()));

        let mut sessions = Vec::new();
        for (d, r) in starts {
            let (session, _) = registry
                .start_continuous("app", REMOTES[r], &ReplicationOptions::new(d, "t"))
                .unwrap();
            sessions.push(session);
        }

        registry.stop_all("app", Direction::Pull).unwrap();

        prop_assert_eq!(registry.list_continuous("app", Direction::Pull).unwrap().iter().count(), 0);
        for session in sessions {
            if session.direction() == Direction::Pull {
                prop_assert_eq!(session.state(), SessionState::Stopped);
            } else {
                prop_assert_eq!(session.state(), SessionState::Running);
            }
        }
    }
}
