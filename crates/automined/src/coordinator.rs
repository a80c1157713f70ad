//! Switch execution.
//!
//! One trigger runs at most `max_retries + 1` attempts back to back. The
//! single-flight guard is held for the whole trigger, retry delays included,
//! so a second trigger in that time is rejected instead of queued.

use automine_shared::{Address, LedgerSummary, OperationLedger, OperationStatus, SwitchOperation};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::chain::ChainClient;
use crate::clock::Clock;
use crate::config::{ExecutionConfig, LedgerConfig};
use crate::error::{ChainError, StoreError, SwitchError};
use crate::events::EngineListener;
use crate::store::{StateStore, IN_FLIGHT_KEY, LEDGER_KEY};

const STALE_ERROR: &str = "stale: interrupted before reaching a terminal state";

/// Limits for one trigger
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub submit_timeout: Duration,
    pub confirmation_timeout: Duration,
}

impl From<&ExecutionConfig> for RetryPolicy {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            submit_timeout: config.submit_timeout(),
            confirmation_timeout: config.confirmation_timeout(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ExecutionConfig::default())
    }
}

pub struct ExecutionCoordinator {
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn StateStore>,
    listener: Arc<dyn EngineListener>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    /// Held for the lifetime of one trigger
    single_flight: Mutex<()>,
    /// Id of the newest attempt of the running trigger
    active: RwLock<Option<String>>,
    in_flight: RwLock<Option<SwitchOperation>>,
    ledger: RwLock<OperationLedger>,
}

impl ExecutionCoordinator {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn StateStore>,
        listener: Arc<dyn EngineListener>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
        ledger: &LedgerConfig,
    ) -> Self {
        Self {
            chain,
            store,
            listener,
            clock,
            policy,
            single_flight: Mutex::new(()),
            active: RwLock::new(None),
            in_flight: RwLock::new(None),
            ledger: RwLock::new(OperationLedger::new(ledger.cap, ledger.trim_to)),
        }
    }

    /// Reload the ledger and close out an operation a crash left behind.
    ///
    /// The interrupted operation is recorded as failed and not retried.
    pub async fn recover(&self) -> Option<SwitchOperation> {
        match self.store.read_snapshot(LEDGER_KEY).await {
            Ok(Some(value)) => match serde_json::from_value::<OperationLedger>(value) {
                Ok(saved) => {
                    let mut ledger = self.ledger.write().await;
                    let (cap, trim_to) = (ledger.cap, ledger.trim_to);
                    *ledger = OperationLedger::with_entries(cap, trim_to, saved.entries);
                    info!("Restored {} operations from ledger", ledger.len());
                }
                Err(e) => warn!("Ignoring corrupt operation ledger: {}", e),
            },
            Ok(None) => debug!("No operation ledger snapshot"),
            Err(e) => warn!("Failed to read operation ledger: {}", e),
        }

        let marker = match self.store.read_snapshot(IN_FLIGHT_KEY).await {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read in-flight marker: {}", e);
                return None;
            }
        };

        let mut op: SwitchOperation = match serde_json::from_value(marker) {
            Ok(op) => op,
            Err(e) => {
                warn!("Discarding corrupt in-flight marker: {}", e);
                self.clear_marker().await;
                return None;
            }
        };

        if self.ledger.read().await.get(&op.id).is_some() {
            // Finished, but the marker was not cleared before the crash
            self.clear_marker().await;
            return None;
        }

        op.fail(STALE_ERROR, self.clock.now());
        warn!(
            "Recovered stale operation {} to {} (status was in flight)",
            op.id, op.target_id
        );
        self.record_terminal(&op).await;
        self.clear_marker().await;
        Some(op)
    }

    /// Run one switch trigger to a terminal state.
    ///
    /// Returns the last attempt: Completed, or Failed once retries are spent.
    pub async fn execute(&self, target: &Address) -> Result<SwitchOperation, SwitchError> {
        let _guard = match self.single_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                let id = self
                    .active
                    .read()
                    .await
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string());
                debug!("Rejecting switch to {}: {} in flight", target, id);
                return Err(SwitchError::AlreadyInFlight(id));
            }
        };

        let mut retry_count = 0;
        let result = loop {
            let op = self.attempt(target, retry_count).await;

            if op.status == OperationStatus::Completed {
                break op;
            }

            if retry_count >= self.policy.max_retries {
                error!(
                    "Switch to {} failed after {} attempts, giving up: {}",
                    target,
                    retry_count + 1,
                    op.error.as_deref().unwrap_or("unknown error")
                );
                break op;
            }

            warn!(
                "Switch attempt {} to {} failed, retrying in {:?}",
                retry_count + 1,
                target,
                self.policy.retry_delay
            );
            tokio::time::sleep(self.policy.retry_delay).await;
            retry_count += 1;
        };

        *self.active.write().await = None;
        Ok(result)
    }

    async fn attempt(&self, target: &Address, retry_count: u32) -> SwitchOperation {
        let mut op = SwitchOperation::new(target.clone(), retry_count, self.clock.now());
        *self.active.write().await = Some(op.id.clone());
        self.set_in_flight(&op).await;
        info!("Switching to {} (op {}, retry {})", target, op.id, retry_count);

        let submitted = match timeout(self.policy.submit_timeout, self.chain.submit_switch(target)).await {
            Ok(result) => result,
            Err(_) => Err(ChainError::Timeout(self.policy.submit_timeout)),
        };

        match submitted {
            Err(e) => op.fail(e.to_string(), self.clock.now()),
            Ok(handle) => {
                op.mark_processing(handle.to_string());
                self.set_in_flight(&op).await;
                debug!("Op {} submitted as {}", op.id, handle);

                let wait = self.policy.confirmation_timeout;
                let confirmed = match timeout(wait, self.chain.await_confirmation(&handle, wait)).await {
                    Ok(result) => result,
                    Err(_) => Err(ChainError::Timeout(wait)),
                };

                match confirmed {
                    Ok(c) if c.success => op.complete(self.clock.now()),
                    Ok(_) => op.fail(format!("transaction {} reverted", handle), self.clock.now()),
                    Err(e) => op.fail(e.to_string(), self.clock.now()),
                }
            }
        }

        self.record_terminal(&op).await;
        self.clear_marker().await;
        op
    }

    async fn set_in_flight(&self, op: &SwitchOperation) {
        *self.in_flight.write().await = Some(op.clone());
        if let Err(e) = self.snapshot(IN_FLIGHT_KEY, op).await {
            warn!("Failed to persist in-flight marker: {}", e);
        }
    }

    async fn clear_marker(&self) {
        *self.in_flight.write().await = None;
        if let Err(e) = self.store.clear_snapshot(IN_FLIGHT_KEY).await {
            warn!("Failed to clear in-flight marker: {}", e);
        }
    }

    async fn record_terminal(&self, op: &SwitchOperation) {
        {
            let mut ledger = self.ledger.write().await;
            let trimmed = ledger.push(op.clone());
            if trimmed > 0 {
                debug!("Trimmed {} old operations from ledger", trimmed);
            }
            if let Err(e) = self.snapshot(LEDGER_KEY, &*ledger).await {
                warn!("Failed to persist operation ledger: {}", e);
            }
        }
        self.listener.on_operation_terminal(op);
    }

    async fn snapshot<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        self.store.snapshot(key, value).await
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn in_flight(&self) -> Option<SwitchOperation> {
        self.in_flight.read().await.clone()
    }

    /// True while a trigger holds the guard, retry delays included
    pub fn is_busy(&self) -> bool {
        self.single_flight.try_lock().is_err()
    }

    /// Wait until no trigger is running
    pub async fn wait_idle(&self) {
        let _ = self.single_flight.lock().await;
    }

    /// All retained operations, oldest first
    pub async fn ledger(&self) -> Vec<SwitchOperation> {
        self.ledger.read().await.entries.clone()
    }

    pub async fn recent(&self, n: usize) -> Vec<SwitchOperation> {
        self.ledger.read().await.recent(n)
    }

    pub async fn operation(&self, id: &str) -> Option<SwitchOperation> {
        self.ledger.read().await.get(id).cloned()
    }

    pub async fn summary(&self) -> LedgerSummary {
        self.ledger.read().await.summary()
    }
}
