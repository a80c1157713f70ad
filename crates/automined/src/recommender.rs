//! Switch recommendations.
//!
//! The verdict only looks at the two current availabilities. Timing analysis
//! is advisory and never changes the verdict.

use automine_shared::{
    Recommendation, StatusSnapshot, SwitchWindow, TargetStatus, TimingAdvice, TimingAnalysis,
    Verdict,
};
use chrono::{DateTime, Duration, Utc};

use crate::config::TimingConfig;

pub struct RecommendationEngine {
    horizon: Duration,
    buffer: Duration,
}

impl Default for RecommendationEngine {
    fn default() -> Self {
        Self::from_config(&TimingConfig::default())
    }
}

impl RecommendationEngine {
    pub fn new(horizon: Duration, buffer: Duration) -> Self {
        Self { horizon, buffer }
    }

    pub fn from_config(config: &TimingConfig) -> Self {
        Self::new(
            Duration::seconds(config.horizon_secs as i64),
            Duration::seconds(config.buffer_secs as i64),
        )
    }

    /// Decide from the two live statuses.
    ///
    /// Only "current down, target up" switches. "Both down" waits with the
    /// target as a hint; everything else is no action.
    pub fn evaluate(&self, current: &TargetStatus, target: &TargetStatus) -> Recommendation {
        let (verdict, target_id, reason) = match (current.is_available, target.is_available) {
            (false, true) => (
                Verdict::Switch,
                Some(target.id.clone()),
                format!(
                    "Current target {} is inactive, target {} is active",
                    current.label, target.label
                ),
            ),
            (true, false) => (
                Verdict::NoAction,
                None,
                format!(
                    "Current target {} is still active, target {} is inactive",
                    current.label, target.label
                ),
            ),
            (false, false) => (
                Verdict::Wait,
                Some(target.id.clone()),
                format!("Both targets are inactive, waiting for {} to open", target.label),
            ),
            (true, true) => (
                Verdict::NoAction,
                None,
                "Both targets are active, no switch needed".to_string(),
            ),
        };

        Recommendation {
            verdict,
            target_id,
            reason,
            snapshot: StatusSnapshot {
                current: current.clone(),
                target: target.clone(),
            },
        }
    }

    /// Forced rotation to the other target, regardless of availability
    pub fn rotation(&self, current: &TargetStatus, target: &TargetStatus) -> Recommendation {
        Recommendation {
            verdict: Verdict::Switch,
            target_id: Some(target.id.clone()),
            reason: format!("Scheduled rotation from {} to {}", current.label, target.label),
            snapshot: StatusSnapshot {
                current: current.clone(),
                target: target.clone(),
            },
        }
    }

    /// Window in which switching looks worthwhile, if the current target is
    /// expected to change within the horizon.
    pub fn optimal_window(
        &self,
        current: Option<&TimingAnalysis>,
        target: Option<&TimingAnalysis>,
        now: DateTime<Utc>,
    ) -> Option<SwitchWindow> {
        let (current, target) = (current?, target?);

        if current.predicted_next_change >= now + self.horizon {
            return None;
        }

        let start = now.max(target.predicted_next_change - self.buffer);
        Some(SwitchWindow {
            start,
            end: current.predicted_next_change,
        })
    }

    pub fn timing_advice(
        &self,
        current: Option<TimingAnalysis>,
        target: Option<TimingAnalysis>,
        now: DateTime<Utc>,
    ) -> TimingAdvice {
        let window = self.optimal_window(current.as_ref(), target.as_ref(), now);
        let note = match (&current, &target, &window) {
            (None, _, _) | (_, None, _) => "Insufficient data for timing analysis",
            (_, _, Some(_)) => "Optimal switch window identified",
            (_, _, None) => "Timing patterns suggest waiting",
        };

        TimingAdvice {
            current,
            target,
            window,
            note: note.to_string(),
        }
    }
}
