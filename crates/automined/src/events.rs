//! Engine listeners.
//!
//! Listeners are called synchronously from the engine and must not block.
//! Anything slow (disk, network) is handed to a background task.

use automine_shared::{Address, Recommendation, StatusHistoryEntry, SwitchOperation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::store::{StateStore, AUDIT_KEY};

pub trait EngineListener: Send + Sync {
    fn on_recommendation(&self, _recommendation: &Recommendation) {}

    fn on_operation_terminal(&self, _operation: &SwitchOperation) {}

    fn on_status_change(&self, _target: &Address, _entry: &StatusHistoryEntry) {}
}

/// Listener that does nothing
pub struct NoopListener;

impl EngineListener for NoopListener {}

// ============================================================================
// Tracing
// ============================================================================

/// Writes every event as a structured log line
pub struct TracingListener;

impl EngineListener for TracingListener {
    fn on_recommendation(&self, r: &Recommendation) {
        info!(
            verdict = %r.verdict,
            target_id = ?r.target_id.as_ref().map(|t| t.as_str()),
            current_available = r.snapshot.current.is_available,
            target_available = r.snapshot.target.is_available,
            "Recommendation: {}",
            r.reason
        );
    }

    fn on_operation_terminal(&self, op: &SwitchOperation) {
        match &op.error {
            None => info!(
                op = %op.id,
                target_id = %op.target_id,
                retry = op.retry_count,
                tx = ?op.tx_handle,
                "Switch {}",
                op.status
            ),
            Some(err) => warn!(
                op = %op.id,
                target_id = %op.target_id,
                retry = op.retry_count,
                "Switch {}: {}",
                op.status,
                err
            ),
        }
    }

    fn on_status_change(&self, target: &Address, entry: &StatusHistoryEntry) {
        info!(
            target_id = %target,
            available = entry.is_available,
            "Target became {}",
            if entry.is_available { "active" } else { "inactive" }
        );
    }
}

// ============================================================================
// Audit trail
// ============================================================================

/// One line of the audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecord {
    Recommendation {
        at: DateTime<Utc>,
        recommendation: Recommendation,
    },
    Operation {
        operation: SwitchOperation,
    },
    StatusChange {
        target: Address,
        entry: StatusHistoryEntry,
    },
}

/// Forwards events to the store's audit log from a background task
pub struct StoreListener {
    tx: mpsc::UnboundedSender<AuditRecord>,
}

impl StoreListener {
    /// Start the writer task. It exits once every listener clone is dropped.
    pub fn spawn(store: Arc<dyn StateStore>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditRecord>();

        let handle = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                let value = match serde_json::to_value(&record) {
                    Ok(v) => v,
                    Err(e) => {
                        error!("Failed to encode audit record: {}", e);
                        continue;
                    }
                };
                if let Err(e) = store.append(AUDIT_KEY, value).await {
                    warn!("Failed to append audit record: {}", e);
                }
            }
        });

        (Self { tx }, handle)
    }

    fn send(&self, record: AuditRecord) {
        // Writer gone means we are shutting down
        let _ = self.tx.send(record);
    }
}

impl EngineListener for StoreListener {
    fn on_recommendation(&self, recommendation: &Recommendation) {
        self.send(AuditRecord::Recommendation {
            at: recommendation.snapshot.current.observed_at,
            recommendation: recommendation.clone(),
        });
    }

    fn on_operation_terminal(&self, operation: &SwitchOperation) {
        self.send(AuditRecord::Operation {
            operation: operation.clone(),
        });
    }

    fn on_status_change(&self, target: &Address, entry: &StatusHistoryEntry) {
        self.send(AuditRecord::StatusChange {
            target: target.clone(),
            entry: *entry,
        });
    }
}

// ============================================================================
// Composition and testing
// ============================================================================

/// Calls each inner listener in order
#[derive(Default)]
pub struct FanoutListener {
    listeners: Vec<Arc<dyn EngineListener>>,
}

impl FanoutListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, listener: Arc<dyn EngineListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl EngineListener for FanoutListener {
    fn on_recommendation(&self, recommendation: &Recommendation) {
        for l in &self.listeners {
            l.on_recommendation(recommendation);
        }
    }

    fn on_operation_terminal(&self, operation: &SwitchOperation) {
        for l in &self.listeners {
            l.on_operation_terminal(operation);
        }
    }

    fn on_status_change(&self, target: &Address, entry: &StatusHistoryEntry) {
        for l in &self.listeners {
            l.on_status_change(target, entry);
        }
    }
}

/// Keeps every event in memory
#[derive(Default)]
pub struct RecordingListener {
    recommendations: Mutex<Vec<Recommendation>>,
    operations: Mutex<Vec<SwitchOperation>>,
    status_changes: Mutex<Vec<(Address, StatusHistoryEntry)>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recommendations(&self) -> Vec<Recommendation> {
        lock(&self.recommendations).clone()
    }

    pub fn operations(&self) -> Vec<SwitchOperation> {
        lock(&self.operations).clone()
    }

    pub fn status_changes(&self) -> Vec<(Address, StatusHistoryEntry)> {
        lock(&self.status_changes).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl EngineListener for RecordingListener {
    fn on_recommendation(&self, recommendation: &Recommendation) {
        lock(&self.recommendations).push(recommendation.clone());
    }

    fn on_operation_terminal(&self, operation: &SwitchOperation) {
        lock(&self.operations).push(operation.clone());
    }

    fn on_status_change(&self, target: &Address, entry: &StatusHistoryEntry) {
        lock(&self.status_changes).push((target.clone(), *entry));
    }
}
