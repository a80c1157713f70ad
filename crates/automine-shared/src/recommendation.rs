//! Recommendation verdicts.

use serde::{Deserialize, Serialize};

use crate::target::{Address, TargetStatus};

/// What the engine thinks should happen next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Switch,
    Wait,
    NoAction,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Switch => write!(f, "switch"),
            Verdict::Wait => write!(f, "wait"),
            Verdict::NoAction => write!(f, "no-action"),
        }
    }
}

/// Statuses the verdict was derived from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub current: TargetStatus,
    pub target: TargetStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub verdict: Verdict,
    /// Set for `Switch`, and as a hint for `Wait`. Never set for `NoAction`.
    pub target_id: Option<Address>,
    pub reason: String,
    pub snapshot: StatusSnapshot,
}

impl Recommendation {
    pub fn is_switch(&self) -> bool {
        self.verdict == Verdict::Switch
    }
}
