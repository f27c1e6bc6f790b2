//! Integration tests for StateManager with state change events
//!
//! These tests verify that the StateManager correctly:
//! - Emits state change events on mutations
//! - Supports multiple subscribers
//! - Allows only one active run, even under concurrent starts
//! - Maintains consistency across run transitions

use mapsearch::models::{PoiRecord, RunOutcome, RunPhase, StrategyKind};
use mapsearch::{StateChange, StateManager};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{Duration, timeout};

fn regions(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn poi(name: &str) -> PoiRecord {
    let mut map = Map::new();
    map.insert("name".to_string(), Value::String(name.to_string()));
    PoiRecord::new(map)
}

async fn collect_events(rx: &mut broadcast::Receiver<StateChange>) -> Vec<StateChange> {
    let mut events = Vec::new();
    while let Ok(Ok(event)) = timeout(Duration::from_millis(50), rx.recv()).await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_run_started_event_emitted() {
    let state = StateManager::new();
    let mut rx = state.subscribe();

    state
        .try_begin_run("museum", &regions(&["Springfield", "Chicago"]), StrategyKind::Sequential)
        .unwrap();

    let events = collect_events(&mut rx).await;
    assert!(events.contains(&StateChange::PhaseChanged {
        from: RunPhase::Idle,
        to: RunPhase::Running,
    }));
    assert!(events.contains(&StateChange::RunStarted {
        keyword: "museum".to_string(),
        total_regions: 2,
        strategy: StrategyKind::Sequential,
    }));
}

#[tokio::test]
async fn test_multiple_subscribers_receive_events() {
    let state = Arc::new(StateManager::new());
    let mut rx1 = state.subscribe();
    let mut rx2 = state.subscribe();
    let mut rx3 = state.subscribe();

    state
        .try_begin_run("museum", &regions(&["Springfield"]), StrategyKind::Sequential)
        .unwrap();

    for rx in [&mut rx1, &mut rx2, &mut rx3] {
        let event = timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("Timeout waiting for event")
            .expect("Channel closed");
        assert!(
            matches!(event, StateChange::PhaseChanged { to: RunPhase::Running, .. }),
            "Expected PhaseChanged to Running, got: {:?}",
            event
        );
    }
}

#[tokio::test]
async fn test_progress_and_record_events() {
    let state = StateManager::new();
    state
        .try_begin_run("museum", &regions(&["Springfield", "Chicago"]), StrategyKind::Sequential)
        .unwrap();
    let mut rx = state.subscribe();

    state.set_cursor("Springfield", 1);
    state.push_records(&[poi("A"), poi("B")]);
    state.mark_region_complete("Springfield");

    let events = collect_events(&mut rx).await;
    assert!(events.contains(&StateChange::RecordsCollected { total: 2 }));
    assert!(events.iter().any(|e| matches!(
        e,
        StateChange::ProgressUpdated { completed: 1, total: 2, .. }
    )));

    // Moving the page cursor within the same region is not a progress change
    let changes = state.set_cursor("Springfield", 2);
    assert!(changes.is_empty());
}

#[tokio::test]
async fn test_pause_resume_and_finish_transitions() {
    let state = StateManager::new();
    state
        .try_begin_run("museum", &regions(&["Springfield"]), StrategyKind::ChunkedBatch)
        .unwrap();

    let changes = state.set_paused(true);
    assert_eq!(
        changes,
        vec![StateChange::PhaseChanged {
            from: RunPhase::Running,
            to: RunPhase::Paused,
        }]
    );
    assert!(state.is_active());

    state.set_paused(false);
    assert_eq!(state.phase(), RunPhase::Running);

    state.push_records(&[poi("A")]);
    let changes = state.finish_run(RunOutcome::CredentialsExhausted);
    assert!(changes.contains(&StateChange::RunFinished {
        outcome: RunOutcome::CredentialsExhausted,
        records: 1,
    }));
    assert_eq!(state.phase(), RunPhase::CredentialsExhausted);
    assert!(!state.is_active());

    // Pausing a finished run does nothing
    assert!(state.set_paused(true).is_empty());
}

#[tokio::test]
async fn test_second_begin_rejected_while_active() {
    let state = StateManager::new();
    state
        .try_begin_run("museum", &regions(&["Springfield"]), StrategyKind::Sequential)
        .unwrap();
    state.set_paused(true);

    let rejected = state.try_begin_run("park", &regions(&["Chicago"]), StrategyKind::Sequential);
    assert_eq!(rejected, Err(RunPhase::Paused));
    assert_eq!(state.read(|s| s.keyword.clone()), "museum");

    state.finish_run(RunOutcome::Cancelled);
    assert!(state
        .try_begin_run("park", &regions(&["Chicago"]), StrategyKind::Sequential)
        .is_ok());
}

#[tokio::test]
async fn test_concurrent_begin_only_one_wins() {
    let state = Arc::new(StateManager::new());

    let mut handles = vec![];
    for i in 0..10 {
        let state_clone = Arc::clone(&state);
        handles.push(tokio::spawn(async move {
            state_clone
                .try_begin_run(&format!("kw{}", i), &regions(&["Springfield"]), StrategyKind::Sequential)
                .is_ok()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(state.phase(), RunPhase::Running);
}

#[tokio::test]
async fn test_reset_run_state() {
    let state = StateManager::new();
    state
        .try_begin_run("museum", &regions(&["Springfield"]), StrategyKind::Sequential)
        .unwrap();
    state.push_records(&[poi("A")]);

    // Ignored while active
    assert!(state.reset_run_state().is_empty());
    assert_eq!(state.records().len(), 1);

    state.finish_run(RunOutcome::Completed);
    let mut rx = state.subscribe();
    let changes = state.reset_run_state();

    assert!(changes.contains(&StateChange::StateReset));
    assert_eq!(state.phase(), RunPhase::Idle);
    assert!(state.records().is_empty());

    let events = collect_events(&mut rx).await;
    assert_eq!(events.last(), Some(&StateChange::StateReset));
}
