//! Timing analysis results.
//!
//! Durations are carried as milliseconds so the values survive JSON round trips
//! without precision games; use the accessor methods for `chrono::Duration`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Derived view over one target's transition history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingAnalysis {
    /// Mean length of periods that started with the target active
    pub avg_active_ms: f64,
    /// Mean length of periods that started with the target inactive
    pub avg_inactive_ms: f64,
    /// Timestamp of the most recent transition
    pub last_change: DateTime<Utc>,
    /// Expected time of the next transition
    pub predicted_next_change: DateTime<Utc>,
    /// Heuristic confidence in [0, 1]
    pub confidence: f64,
}

impl TimingAnalysis {
    pub fn avg_active(&self) -> Duration {
        Duration::milliseconds(self.avg_active_ms.round() as i64)
    }

    pub fn avg_inactive(&self) -> Duration {
        Duration::milliseconds(self.avg_inactive_ms.round() as i64)
    }
}

/// Advisory window in which a switch is expected to be worthwhile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SwitchWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// Timing report for the current/candidate pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingAdvice {
    pub current: Option<TimingAnalysis>,
    pub target: Option<TimingAnalysis>,
    pub window: Option<SwitchWindow>,
    pub note: String,
}
