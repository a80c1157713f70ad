//! End-to-end engine cycles against the fake chain.

mod common;

use automine_shared::{OperationStatus, Verdict};
use automined::store::{IN_FLIGHT_KEY, LEDGER_KEY};
use automined::{CycleOutcome, JsonFileStore, ManualClock, MemoryStore, StateStore};
use chrono::{Duration, TimeZone, Utc};
use common::*;
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Monitor cycle
// ============================================================================

#[tokio::test]
async fn test_inactive_current_active_target_switches() {
    let h = harness(chain(false, true).build()).await;

    let op = match h.engine.run_monitor_cycle().await {
        CycleOutcome::Executed(op) => op,
        other => panic!("expected a switch, got {:?}", other),
    };

    assert_eq!(op.status, OperationStatus::Completed);
    assert_eq!(op.retry_count, 0);
    assert_eq!(op.target_id, secondary());
    assert_eq!(h.fake.submitted_targets(), vec![secondary()]);

    let recs = h.events.recommendations();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].verdict, Verdict::Switch);
    assert_eq!(recs[0].target_id, Some(secondary()));
    assert_eq!(h.events.operations(), vec![op]);

    let status = h.engine.status().await;
    assert_eq!(status.current_target, Some(secondary()));
    assert_eq!(status.ledger.completed, 1);
}

#[tokio::test]
async fn test_both_active_takes_no_action() {
    let h = harness(chain(true, true).build()).await;

    match h.engine.run_monitor_cycle().await {
        CycleOutcome::Evaluated(r) => {
            assert_eq!(r.verdict, Verdict::NoAction);
            assert!(r.target_id.is_none());
        }
        other => panic!("expected no action, got {:?}", other),
    }
    assert_eq!(h.fake.submit_calls(), 0);
    assert!(h.events.operations().is_empty());
}

#[tokio::test]
async fn test_read_failure_skips_cycle_then_recovers() {
    let h = harness(chain(false, true).build()).await;
    h.fake.fail_next_reads(1);

    assert!(matches!(
        h.engine.run_monitor_cycle().await,
        CycleOutcome::Skipped(_)
    ));
    assert!(h.events.recommendations().is_empty());
    assert!(h.engine.tracker().history(&primary()).await.is_empty());
    assert_eq!(h.engine.status().await.cycle_errors, 1);

    assert!(matches!(
        h.engine.run_monitor_cycle().await,
        CycleOutcome::Executed(_)
    ));
}

#[tokio::test]
async fn test_history_records_transitions_only() {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let h = harness_with(
        config(),
        chain(true, true).build(),
        Arc::new(MemoryStore::new()),
        clock.clone(),
    )
    .await;

    // Secondary flaps while primary stays up; nothing is ever switched
    for up in [true, true, false, false, true, false] {
        h.fake.set_available(&secondary(), up);
        h.engine.run_monitor_cycle().await;
        clock.advance(Duration::seconds(30));
    }

    let secondary_history = h.engine.tracker().history(&secondary()).await;
    assert_eq!(
        secondary_history
            .iter()
            .map(|e| e.is_available)
            .collect::<Vec<_>>(),
        vec![true, false, true, false]
    );
    assert_eq!(h.engine.tracker().history(&primary()).await.len(), 1);
    assert_eq!(h.events.status_changes().len(), 5);
    assert_eq!(h.fake.submit_calls(), 0);
}

#[tokio::test]
async fn test_timing_advice_after_enough_transitions() {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let h = harness_with(
        config(),
        chain(true, false).build(),
        Arc::new(MemoryStore::new()),
        clock.clone(),
    )
    .await;

    for up in [false, true, false, true] {
        h.fake.set_available(&secondary(), up);
        h.fake.set_available(&primary(), true);
        h.engine.run_monitor_cycle().await;
        clock.advance(Duration::minutes(20));
    }

    let advice = h.engine.timing_advice(&primary(), &secondary()).await;
    assert!(advice.current.is_none());
    let target = advice.target.unwrap();
    assert_eq!(target.avg_active(), Duration::minutes(20));
    assert_eq!(target.avg_inactive(), Duration::minutes(20));
    assert_eq!(target.confidence, 1.0);
    assert!(advice.note.starts_with("Insufficient"));
}

// ============================================================================
// Rotation cycle
// ============================================================================

#[tokio::test]
async fn test_rotation_moves_to_other_target_and_back() {
    let h = harness(chain(true, true).build()).await;

    match h.engine.run_rotation_cycle().await {
        CycleOutcome::Executed(op) => assert_eq!(op.target_id, secondary()),
        other => panic!("expected rotation, got {:?}", other),
    }
    match h.engine.run_rotation_cycle().await {
        CycleOutcome::Executed(op) => assert_eq!(op.target_id, primary()),
        other => panic!("expected rotation, got {:?}", other),
    }
    assert_eq!(h.fake.submitted_targets(), vec![secondary(), primary()]);

    let recs = h.events.recommendations();
    assert!(recs.iter().all(|r| r.verdict == Verdict::Switch));
    assert!(recs[0].reason.contains("rotation"));
}

#[tokio::test]
async fn test_rotation_skipped_without_deposits() {
    let h = harness(chain(true, true).deposits(0).build()).await;

    assert_eq!(h.engine.run_rotation_cycle().await, CycleOutcome::NoDeposits);
    assert_eq!(h.fake.submit_calls(), 0);
    assert!(h.events.recommendations().is_empty());
}

#[tokio::test]
async fn test_rotation_read_failure_skips() {
    let h = harness(chain(true, true).build()).await;
    h.fake.fail_next_reads(1);

    assert!(matches!(
        h.engine.run_rotation_cycle().await,
        CycleOutcome::Skipped(_)
    ));
    assert_eq!(h.fake.submit_calls(), 0);
}

// ============================================================================
// Restart
// ============================================================================

#[tokio::test]
async fn test_restart_restores_history_and_ledger() {
    let temp = TempDir::new().unwrap();

    {
        let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::new(temp.path()));
        let h = harness_with(
            config(),
            chain(false, true).build(),
            store,
            Arc::new(automined::SystemClock),
        )
        .await;
        assert!(matches!(
            h.engine.run_monitor_cycle().await,
            CycleOutcome::Executed(_)
        ));
    }

    assert!(temp.path().join("status-history.json").exists());
    assert!(temp.path().join("operation-ledger.json").exists());
    assert!(!temp.path().join("in-flight.json").exists());

    let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::new(temp.path()));
    let h = harness_with(
        config(),
        chain(false, true).build(),
        store,
        Arc::new(automined::SystemClock),
    )
    .await;

    assert!(h.engine.recover().await.is_none());
    assert_eq!(h.engine.tracker().history(&primary()).await.len(), 1);
    assert_eq!(h.engine.tracker().history(&secondary()).await.len(), 1);
    assert_eq!(h.engine.coordinator().ledger().await.len(), 1);
}

#[tokio::test]
async fn test_restart_closes_stale_operation() {
    let temp = TempDir::new().unwrap();
    let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::new(temp.path()));

    let mut stale = automine_shared::SwitchOperation::new(secondary(), 0, Utc::now());
    stale.mark_processing("0xfeed");
    store
        .snapshot(IN_FLIGHT_KEY, serde_json::to_value(&stale).unwrap())
        .await
        .unwrap();

    let h = harness_with(
        config(),
        chain(false, true).build(),
        Arc::clone(&store),
        Arc::new(automined::SystemClock),
    )
    .await;

    let recovered = h.engine.recover().await.unwrap();
    assert_eq!(recovered.id, stale.id);
    assert_eq!(recovered.status, OperationStatus::Failed);
    assert_eq!(h.fake.submit_calls(), 0);
    assert!(store.read_snapshot(IN_FLIGHT_KEY).await.unwrap().is_none());
    assert!(store.read_snapshot(LEDGER_KEY).await.unwrap().is_some());

    let status = h.engine.status().await;
    assert_eq!(status.ledger.failed, 1);
    assert_eq!(status.recent_operations[0].id, stale.id);
}
