//! Governor persistence across engine instances.
//!
//! The rate-limit window and circuit breaker must survive process
//! restarts, so every scenario here builds a second governor over the same
//! state file and asserts it inherits the first one's state.

use std::sync::Arc;

use swap_engine::config::GovernorConfig;
use swap_engine::governor::{FileStateStore, RpcGovernor};

fn config() -> GovernorConfig {
    GovernorConfig {
        max_calls_per_window: 50,
        window_secs: 60,
        breaker_cooldown_secs: 300,
        state_path: None,
        usage_path: None,
    }
}

#[tokio::test]
async fn window_counter_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("governor.json");

    let first = RpcGovernor::new(
        config(),
        Arc::new(FileStateStore::new(state_path.clone(), None)),
    );
    for _ in 0..50 {
        assert!(first.check_and_reserve().await.unwrap().allowed);
    }
    drop(first);

    // A fresh instance over the same file inherits the exhausted window
    let second = RpcGovernor::new(
        config(),
        Arc::new(FileStateStore::new(state_path, None)),
    );
    let decision = second.check_and_reserve().await.unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.reason.as_deref(), Some("rate_limit"));
    assert!(!decision.degraded);
}

#[tokio::test]
async fn tripped_breaker_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("governor.json");

    let first = RpcGovernor::new(
        config(),
        Arc::new(FileStateStore::new(state_path.clone(), None)),
    );
    first.trip_breaker().await;
    drop(first);

    let second = RpcGovernor::new(
        config(),
        Arc::new(FileStateStore::new(state_path, None)),
    );
    let decision = second.check_and_reserve().await.unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.reason.as_deref(), Some("circuit_breaker"));
}

#[tokio::test]
async fn unreachable_store_degrades_but_keeps_counting() {
    let dir = tempfile::tempdir().unwrap();
    // A directory at the state path makes every read and write fail
    let state_path = dir.path().join("governor.json");
    tokio::fs::create_dir(&state_path).await.unwrap();

    let governor = RpcGovernor::new(
        config(),
        Arc::new(FileStateStore::new(state_path, None)),
    );

    for _ in 0..50 {
        let decision = governor.check_and_reserve().await.unwrap();
        assert!(decision.allowed);
        assert!(decision.degraded);
    }

    // The in-process fallback still enforces the window
    let decision = governor.check_and_reserve().await.unwrap();
    assert!(!decision.allowed);
    assert!(decision.degraded);
    assert_eq!(decision.reason.as_deref(), Some("rate_limit"));
}

#[tokio::test]
async fn usage_telemetry_is_appended() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("governor.json");
    let usage_path = dir.path().join("usage.jsonl");

    let governor = RpcGovernor::new(
        config(),
        Arc::new(FileStateStore::new(state_path, Some(usage_path.clone()))),
    );

    for _ in 0..5 {
        governor.check_and_reserve().await.unwrap();
    }

    // Appends are spawned off the critical path; give them a beat
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let contents = tokio::fs::read_to_string(&usage_path).await.unwrap();
    assert_eq!(contents.lines().count(), 5);
    for line in contents.lines() {
        let record: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(record["allowed"], true);
    }
}
