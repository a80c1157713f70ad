//! Switch operations and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::target::Address;

/// Lifecycle state of a single switch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Completed | OperationStatus::Failed)
    }

    pub fn is_in_flight(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationStatus::Pending => write!(f, "pending"),
            OperationStatus::Processing => write!(f, "processing"),
            OperationStatus::Completed => write!(f, "completed"),
            OperationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One attempt to move the active mine to `target_id`.
///
/// Retries are separate operations carrying an incremented `retry_count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchOperation {
    pub id: String,
    pub target_id: Address,
    pub started_at: DateTime<Utc>,
    pub status: OperationStatus,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl SwitchOperation {
    pub fn new(target_id: Address, retry_count: u32, started_at: DateTime<Utc>) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!("switch_{}_{}", started_at.timestamp_millis(), &suffix[..8]),
            target_id,
            started_at,
            status: OperationStatus::Pending,
            retry_count,
            tx_handle: None,
            error: None,
            finished_at: None,
        }
    }

    pub fn mark_processing(&mut self, tx_handle: impl Into<String>) {
        self.status = OperationStatus::Processing;
        self.tx_handle = Some(tx_handle.into());
    }

    pub fn complete(&mut self, at: DateTime<Utc>) {
        self.status = OperationStatus::Completed;
        self.error = None;
        self.finished_at = Some(at);
    }

    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) {
        self.status = OperationStatus::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(at);
    }

    /// Wall time between start and terminal state, in milliseconds
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn target() -> Address {
        Address::parse("0x2222222222222222222222222222222222222222").unwrap()
    }

    #[test]
    fn test_new_operation_is_pending() {
        let op = SwitchOperation::new(target(), 0, Utc::now());
        assert_eq!(op.status, OperationStatus::Pending);
        assert!(op.id.starts_with("switch_"));
        assert!(op.status.is_in_flight());
    }

    #[test]
    fn test_operation_ids_unique_within_same_millisecond() {
        let at = Utc::now();
        let a = SwitchOperation::new(target(), 0, at);
        let b = SwitchOperation::new(target(), 0, at);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_lifecycle_to_completed() {
        let start = Utc::now();
        let mut op = SwitchOperation::new(target(), 1, start);
        op.mark_processing("0xdeadbeef");
        assert_eq!(op.status, OperationStatus::Processing);
        assert_eq!(op.tx_handle.as_deref(), Some("0xdeadbeef"));

        op.complete(start + Duration::seconds(12));
        assert!(op.status.is_terminal());
        assert_eq!(op.duration_ms(), Some(12_000));
    }

    #[test]
    fn test_fail_captures_error() {
        let start = Utc::now();
        let mut op = SwitchOperation::new(target(), 0, start);
        op.fail("reverted", start);
        assert_eq!(op.status, OperationStatus::Failed);
        assert_eq!(op.error.as_deref(), Some("reverted"));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&OperationStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }
}
