//! Engine status snapshot for dashboards and periodic status logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::LedgerSummary;
use crate::operation::SwitchOperation;
use crate::recommendation::Recommendation;
use crate::target::Address;

/// Which scheduler cadence ran last
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    Startup,
    Monitor,
    Rotation,
}

impl std::fmt::Display for CycleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleKind::Startup => write!(f, "startup"),
            CycleKind::Monitor => write!(f, "monitor"),
            CycleKind::Rotation => write!(f, "rotation"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub version: String,
    pub running: bool,
    pub started_at: DateTime<Utc>,
    pub current_target: Option<Address>,
    pub last_cycle: CycleKind,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_recommendation: Option<Recommendation>,
    pub in_flight: Option<SwitchOperation>,
    /// Most recent first
    pub recent_operations: Vec<SwitchOperation>,
    pub ledger: LedgerSummary,
    pub cycle_errors: u64,
}

impl EngineStatus {
    /// One-line summary for periodic status logs
    pub fn summary_line(&self) -> String {
        let current = self
            .current_target
            .as_ref()
            .map(|a| a.short())
            .unwrap_or_else(|| "unknown".to_string());
        let verdict = self
            .last_recommendation
            .as_ref()
            .map(|r| r.verdict.to_string())
            .unwrap_or_else(|| "none".to_string());
        format!(
            "current={} last_cycle={} verdict={} in_flight={} ops={} (ok={}, failed={}) errors={}",
            current,
            self.last_cycle,
            verdict,
            self.in_flight.is_some(),
            self.ledger.total,
            self.ledger.completed,
            self.ledger.failed,
            self.cycle_errors
        )
    }
}
