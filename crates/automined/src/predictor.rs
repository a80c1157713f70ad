//! Timing prediction from transition history.
//!
//! A heuristic, not a statistical model: gaps are averaged per state and the
//! spread of all gaps is turned into a rough confidence figure.

use automine_shared::{StatusHistoryEntry, TimingAnalysis};
use chrono::Duration;

/// Fewer entries than this gives no analysis
pub const MIN_ENTRIES: usize = 4;

pub fn analyze(history: &[StatusHistoryEntry]) -> Option<TimingAnalysis> {
    if history.len() < MIN_ENTRIES {
        return None;
    }

    let mut active = Vec::new();
    let mut inactive = Vec::new();
    let mut gaps = Vec::with_capacity(history.len() - 1);

    for pair in history.windows(2) {
        let gap = (pair[1].at - pair[0].at).num_milliseconds() as f64;
        if pair[0].is_available {
            active.push(gap);
        } else {
            inactive.push(gap);
        }
        gaps.push(gap);
    }

    let avg_active_ms = mean(&active);
    let avg_inactive_ms = mean(&inactive);

    let last = history.last()?;
    let expected = if last.is_available {
        avg_active_ms
    } else {
        avg_inactive_ms
    };
    let predicted_next_change = last.at + Duration::milliseconds(expected.round() as i64);

    let denominator = avg_active_ms.max(avg_inactive_ms);
    let confidence = if denominator > 0.0 {
        (1.0 - variance(&gaps) / denominator).clamp(0.0, 1.0)
    } else {
        0.0
    };

    Some(TimingAnalysis {
        avg_active_ms,
        avg_inactive_ms,
        last_change: last.at,
        predicted_next_change,
        confidence,
    })
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance; zero below two samples
fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    /// Alternating history starting active, with the given gaps in minutes
    fn history(gaps_min: &[i64]) -> Vec<StatusHistoryEntry> {
        let mut at = t0();
        let mut out = vec![StatusHistoryEntry::new(true, at)];
        for (i, gap) in gaps_min.iter().enumerate() {
            at += Duration::minutes(*gap);
            out.push(StatusHistoryEntry::new(i % 2 == 1, at));
        }
        out
    }

    #[test]
    fn test_too_short_history() {
        assert!(analyze(&[]).is_none());
        assert!(analyze(&history(&[10, 20])).is_none());
        assert!(analyze(&history(&[10, 20, 30])).is_some());
    }

    #[test]
    fn test_partitioned_means() {
        // active 60, inactive 30, active 60
        let h = history(&[60, 30, 60]);
        let a = analyze(&h).unwrap();

        assert_eq!(a.avg_active(), Duration::minutes(60));
        assert_eq!(a.avg_inactive(), Duration::minutes(30));
        assert_eq!(a.last_change, t0() + Duration::minutes(150));
        // Last entry is inactive, so the inactive mean is projected
        assert_eq!(a.predicted_next_change, t0() + Duration::minutes(180));
    }

    #[test]
    fn test_regular_gaps_full_confidence() {
        let a = analyze(&history(&[45, 45, 45, 45])).unwrap();
        assert_eq!(a.confidence, 1.0);
        assert_eq!(a.avg_active_ms, a.avg_inactive_ms);
    }

    #[test]
    fn test_irregular_gaps_clamped_to_zero() {
        // Variance in ms^2 dwarfs the mean in ms
        let a = analyze(&history(&[1, 120, 5, 300])).unwrap();
        assert_eq!(a.confidence, 0.0);
    }

    #[test]
    fn test_sub_second_gaps_partial_confidence() {
        // Gaps 1000, 1060, 1000 ms: variance 800 ms^2 against the 1060 ms inactive mean
        let at = t0();
        let h = vec![
            StatusHistoryEntry::new(true, at),
            StatusHistoryEntry::new(false, at + Duration::milliseconds(1000)),
            StatusHistoryEntry::new(true, at + Duration::milliseconds(2060)),
            StatusHistoryEntry::new(false, at + Duration::milliseconds(3060)),
        ];
        let a = analyze(&h).unwrap();

        assert_eq!(a.avg_active_ms, 1000.0);
        assert_eq!(a.avg_inactive_ms, 1060.0);
        assert!((a.confidence - (1.0 - 800.0 / 1060.0)).abs() < 1e-9);
        assert!(a.confidence > 0.0 && a.confidence < 1.0);
    }

    #[test]
    fn test_deterministic() {
        let h = history(&[10, 25, 12, 31, 9]);
        assert_eq!(analyze(&h), analyze(&h));
    }
}
