//! Operation ledger: bounded record of terminal switch operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::operation::{OperationStatus, SwitchOperation};
use crate::{DEFAULT_LEDGER_CAP, DEFAULT_LEDGER_TRIM_TO};

/// Ledger of finished operations, oldest first.
///
/// When a push takes the ledger above `cap`, only the `trim_to` most recent
/// entries are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationLedger {
    pub entries: Vec<SwitchOperation>,
    pub cap: usize,
    pub trim_to: usize,
    pub last_modified: DateTime<Utc>,
}

impl Default for OperationLedger {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_CAP, DEFAULT_LEDGER_TRIM_TO)
    }
}

impl OperationLedger {
    pub fn new(cap: usize, trim_to: usize) -> Self {
        Self {
            entries: Vec::new(),
            cap,
            trim_to: trim_to.min(cap),
            last_modified: Utc::now(),
        }
    }

    /// Restore entries from a persisted ledger under the current limits
    pub fn with_entries(cap: usize, trim_to: usize, entries: Vec<SwitchOperation>) -> Self {
        let mut ledger = Self::new(cap, trim_to);
        ledger.entries = entries;
        ledger.trim();
        ledger
    }

    /// Append a terminal operation. Returns how many entries were trimmed.
    pub fn push(&mut self, op: SwitchOperation) -> usize {
        self.entries.push(op);
        self.last_modified = Utc::now();
        self.trim()
    }

    fn trim(&mut self) -> usize {
        if self.entries.len() <= self.cap {
            return 0;
        }
        let excess = self.entries.len() - self.trim_to;
        self.entries.drain(0..excess);
        excess
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&SwitchOperation> {
        self.entries.iter().rev().find(|op| op.id == id)
    }

    /// Up to `n` most recent operations, most recent first
    pub fn recent(&self, n: usize) -> Vec<SwitchOperation> {
        self.entries.iter().rev().take(n).cloned().collect()
    }

    pub fn summary(&self) -> LedgerSummary {
        let mut summary = LedgerSummary::default();
        for op in &self.entries {
            match op.status {
                OperationStatus::Completed => summary.completed += 1,
                OperationStatus::Failed => summary.failed += 1,
                OperationStatus::Pending | OperationStatus::Processing => {}
            }
            if op.retry_count > 0 {
                summary.retries += 1;
            }
        }
        summary.total = self.entries.len();
        summary.last_completed = self
            .entries
            .iter()
            .rev()
            .find(|op| op.status == OperationStatus::Completed)
            .and_then(|op| op.finished_at);
        summary
    }
}

/// Summary of ledger contents
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LedgerSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub retries: usize,
    pub last_completed: Option<DateTime<Utc>>,
}
