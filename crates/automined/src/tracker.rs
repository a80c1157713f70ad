//! Availability history per target.
//!
//! Only transitions are recorded: a poll that repeats the last known value
//! adds nothing. The whole map is snapshotted to the store after each append
//! so a restart does not lose the timing data.

use automine_shared::{Address, StatusHistoryEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::events::EngineListener;
use crate::store::{StateStore, HISTORY_KEY};

/// Persisted form of one target's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetHistory {
    pub target: Address,
    pub entries: Vec<StatusHistoryEntry>,
}

pub struct StatusTracker {
    histories: RwLock<HashMap<Address, VecDeque<StatusHistoryEntry>>>,
    cap: usize,
    store: Arc<dyn StateStore>,
    listener: Arc<dyn EngineListener>,
}

impl StatusTracker {
    pub fn new(cap: usize, store: Arc<dyn StateStore>, listener: Arc<dyn EngineListener>) -> Self {
        Self {
            histories: RwLock::new(HashMap::new()),
            cap: cap.max(1),
            store,
            listener,
        }
    }

    /// Build a tracker from the last snapshot, or empty if there is none
    pub async fn load(
        cap: usize,
        store: Arc<dyn StateStore>,
        listener: Arc<dyn EngineListener>,
    ) -> Self {
        let tracker = Self::new(cap, store, listener);

        let snapshot = match tracker.store.read_snapshot(HISTORY_KEY).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!("No status history snapshot, starting empty");
                return tracker;
            }
            Err(e) => {
                warn!("Ignoring unreadable status history: {}", e);
                return tracker;
            }
        };

        let saved: Vec<TargetHistory> = match serde_json::from_value(snapshot) {
            Ok(saved) => saved,
            Err(e) => {
                warn!("Ignoring corrupt status history: {}", e);
                return tracker;
            }
        };

        {
            let mut histories = tracker.histories.write().await;
            for TargetHistory { target, entries } in saved {
                let skip = entries.len().saturating_sub(tracker.cap);
                let entries: VecDeque<_> = entries.into_iter().skip(skip).collect();
                histories.insert(target, entries);
            }
            info!("Loaded status history for {} targets", histories.len());
        }

        tracker
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Record a poll result. Returns the new entry if the value changed.
    pub async fn observe(
        &self,
        target: &Address,
        is_available: bool,
        at: DateTime<Utc>,
    ) -> Option<StatusHistoryEntry> {
        let mut histories = self.histories.write().await;
        let history = histories.entry(target.clone()).or_default();

        if let Some(last) = history.back() {
            if last.is_available == is_available {
                return None;
            }
            if at <= last.at {
                warn!(
                    "Dropping out-of-order observation for {} ({} is not after {})",
                    target, at, last.at
                );
                return None;
            }
        }

        let entry = StatusHistoryEntry::new(is_available, at);
        history.push_back(entry);
        while history.len() > self.cap {
            history.pop_front();
        }

        let snapshot = snapshot_of(&histories);
        // Held across the write so snapshots land in append order
        if let Err(e) = self.persist(snapshot).await {
            warn!("Failed to persist status history: {}", e);
        }
        drop(histories);

        self.listener.on_status_change(target, &entry);
        Some(entry)
    }

    /// Transitions for `target`, oldest first
    pub async fn history(&self, target: &Address) -> Vec<StatusHistoryEntry> {
        self.histories
            .read()
            .await
            .get(target)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn last(&self, target: &Address) -> Option<StatusHistoryEntry> {
        self.histories
            .read()
            .await
            .get(target)
            .and_then(|h| h.back().copied())
    }

    async fn persist(&self, snapshot: Vec<TargetHistory>) -> Result<(), StoreError> {
        let value = serde_json::to_value(&snapshot)?;
        self.store.snapshot(HISTORY_KEY, value).await
    }
}

fn snapshot_of(histories: &HashMap<Address, VecDeque<StatusHistoryEntry>>) -> Vec<TargetHistory> {
    let mut snapshot: Vec<TargetHistory> = histories
        .iter()
        .map(|(target, entries)| TargetHistory {
            target: target.clone(),
            entries: entries.iter().copied().collect(),
        })
        .collect();
    snapshot.sort_by(|a, b| a.target.cmp(&b.target));
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{NoopListener, RecordingListener};
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn addr(n: char) -> Address {
        Address::parse(&format!("0x{}", n.to_string().repeat(40))).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn tracker(cap: usize) -> (StatusTracker, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let tracker = StatusTracker::new(cap, store.clone(), Arc::new(NoopListener));
        (tracker, store)
    }

    #[tokio::test]
    async fn test_edge_triggered() {
        let (tracker, store) = tracker(100);
        let target = addr('1');

        let polls = [true, true, false, false, false, true, true];
        let mut appended = 0;
        for (i, value) in polls.iter().enumerate() {
            if tracker
                .observe(&target, *value, t0() + Duration::seconds(30 * i as i64))
                .await
                .is_some()
            {
                appended += 1;
            }
        }

        assert_eq!(appended, 3);
        let history = tracker.history(&target).await;
        assert_eq!(
            history.iter().map(|e| e.is_available).collect::<Vec<_>>(),
            vec![true, false, true]
        );
        // Persisted once per append, not once per poll
        assert_eq!(store.write_count(), 3);
    }

    #[tokio::test]
    async fn test_cap_drops_oldest() {
        let (tracker, _) = tracker(4);
        let target = addr('1');
        for i in 0..10 {
            tracker
                .observe(&target, i % 2 == 0, t0() + Duration::minutes(i))
                .await;
        }

        let history = tracker.history(&target).await;
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].at, t0() + Duration::minutes(6));
        assert_eq!(history[3].at, t0() + Duration::minutes(9));
    }

    #[tokio::test]
    async fn test_out_of_order_dropped() {
        let (tracker, _) = tracker(100);
        let target = addr('1');
        tracker.observe(&target, true, t0()).await;
        assert!(tracker
            .observe(&target, false, t0() - Duration::seconds(1))
            .await
            .is_none());
        assert!(tracker.observe(&target, false, t0()).await.is_none());
        assert_eq!(tracker.history(&target).await.len(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_keeps_memory() {
        let (tracker, store) = tracker(100);
        store.set_fail_writes(true);
        let target = addr('1');
        assert!(tracker.observe(&target, true, t0()).await.is_some());
        assert_eq!(tracker.history(&target).await.len(), 1);
    }

    #[tokio::test]
    async fn test_reload_from_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(RecordingListener::new());
        let first = StatusTracker::new(100, store.clone(), recorder.clone());
        first.observe(&addr('1'), true, t0()).await;
        first.observe(&addr('1'), false, t0() + Duration::hours(1)).await;
        first.observe(&addr('2'), false, t0()).await;
        assert_eq!(recorder.status_changes().len(), 3);

        let second = StatusTracker::load(100, store.clone(), Arc::new(NoopListener)).await;
        assert_eq!(second.history(&addr('1')).await, first.history(&addr('1')).await);
        assert_eq!(second.history(&addr('2')).await.len(), 1);

        // Re-capped on load
        let small = StatusTracker::load(1, store, Arc::new(NoopListener)).await;
        let history = small.history(&addr('1')).await;
        assert_eq!(history.len(), 1);
        assert!(!history[0].is_available);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_starts_empty() {
        let store = Arc::new(MemoryStore::new());
        store
            .snapshot(HISTORY_KEY, serde_json::json!({"not": "a history"}))
            .await
            .unwrap();
        let tracker = StatusTracker::load(100, store, Arc::new(NoopListener)).await;
        assert!(tracker.history(&addr('1')).await.is_empty());
    }
}
