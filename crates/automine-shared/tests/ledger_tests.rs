//! Ledger capacity and trimming behaviour.

use automine_shared::{Address, OperationLedger, OperationStatus, SwitchOperation};
use chrono::{Duration, Utc};

fn finished_op(n: usize) -> SwitchOperation {
    let target = Address::parse("0x4444444444444444444444444444444444444444").unwrap();
    let started = Utc::now() + Duration::seconds(n as i64);
    let mut op = SwitchOperation::new(target, 0, started);
    op.id = format!("op-{:03}", n);
    op.complete(started + Duration::seconds(5));
    op
}

#[test]
fn test_op_101_trims_to_50_most_recent() {
    let mut ledger = OperationLedger::new(100, 50);
    for n in 1..=100 {
        ledger.push(finished_op(n));
    }
    assert_eq!(ledger.len(), 100);

    let trimmed = ledger.push(finished_op(101));
    assert_eq!(trimmed, 51);
    assert_eq!(ledger.len(), 50);

    let ids: Vec<&str> = ledger.entries.iter().map(|op| op.id.as_str()).collect();
    assert_eq!(ids.first(), Some(&"op-052"));
    assert_eq!(ids.last(), Some(&"op-101"));
}

#[test]
fn test_ledger_grows_again_after_trim() {
    let mut ledger = OperationLedger::new(100, 50);
    for n in 1..=101 {
        ledger.push(finished_op(n));
    }
    for n in 102..=151 {
        ledger.push(finished_op(n));
    }
    assert_eq!(ledger.len(), 100);
    ledger.push(finished_op(152));
    assert_eq!(ledger.len(), 50);
    assert_eq!(ledger.entries.last().unwrap().id, "op-152");
}

#[test]
fn test_with_entries_applies_limits() {
    let entries: Vec<SwitchOperation> = (1..=120).map(finished_op).collect();
    let ledger = OperationLedger::with_entries(100, 50, entries);
    assert_eq!(ledger.len(), 50);
    assert_eq!(ledger.entries[0].id, "op-071");
}

#[test]
fn test_ledger_serialization() {
    let mut ledger = OperationLedger::new(10, 5);
    ledger.push(finished_op(1));

    let json = serde_json::to_string(&ledger).unwrap();
    let parsed: OperationLedger = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed.entries[0].status, OperationStatus::Completed);
    assert_eq!(parsed.cap, 10);
}
