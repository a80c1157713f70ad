//! Switch engine: one monitor cycle and one rotation cycle.
//!
//! The scheduler decides when these run. Everything a cycle does is bounded
//! by the read, submit and confirmation timeouts, and a failed read only
//! skips the cycle.
//!
//! Cycles that can switch hold the decision lock from the first chain read
//! until the switch reaches a terminal state, so a cycle never acts on a
//! current target that another cycle is about to change.

use automine_shared::{
    Address, CycleKind, DailySummary, EngineStatus, OperationStatus, Recommendation,
    SwitchOperation, TargetStatus, TimingAdvice, Verdict, VERSION,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::chain::ChainClient;
use crate::clock::Clock;
use crate::config::{Config, TargetPair, TargetSpec};
use crate::coordinator::{ExecutionCoordinator, RetryPolicy};
use crate::error::{ChainError, ConfigError, SwitchError};
use crate::events::EngineListener;
use crate::predictor;
use crate::recommender::RecommendationEngine;
use crate::store::StateStore;
use crate::tracker::StatusTracker;

/// Most recent operations included in a status snapshot
const STATUS_RECENT_OPS: usize = 5;

/// What a single cycle ended up doing
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A chain read failed; nothing was evaluated
    Skipped(String),
    /// The chain reports a current target that is not configured
    UnknownCurrent(Address),
    /// Evaluated, nothing to execute
    Evaluated(Recommendation),
    /// Rotation found nothing to move
    NoDeposits,
    /// The current target already is the one we would switch to
    AlreadyAtTarget(Address),
    /// Another cycle or trigger is deciding or switching
    Busy(String),
    /// A switch ran to a terminal state
    Executed(SwitchOperation),
}

struct EngineState {
    running: bool,
    started_at: DateTime<Utc>,
    current_target: Option<Address>,
    last_cycle: CycleKind,
    last_cycle_at: Option<DateTime<Utc>>,
    last_recommendation: Option<Recommendation>,
    cycle_errors: u64,
}

pub struct SwitchEngine {
    chain: Arc<dyn ChainClient>,
    targets: TargetPair,
    tracker: StatusTracker,
    recommender: RecommendationEngine,
    coordinator: ExecutionCoordinator,
    listener: Arc<dyn EngineListener>,
    clock: Arc<dyn Clock>,
    read_timeout: Duration,
    decision: Mutex<()>,
    state: RwLock<EngineState>,
}

impl SwitchEngine {
    /// Validate the configuration and assemble the components.
    ///
    /// Status history is reloaded from the store; the ledger is restored by
    /// [`SwitchEngine::recover`].
    pub async fn new(
        config: &Config,
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn StateStore>,
        listener: Arc<dyn EngineListener>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let targets = config.validate()?;

        let tracker =
            StatusTracker::load(config.history.cap, Arc::clone(&store), Arc::clone(&listener)).await;
        let coordinator = ExecutionCoordinator::new(
            Arc::clone(&chain),
            store,
            Arc::clone(&listener),
            Arc::clone(&clock),
            RetryPolicy::from(&config.execution),
            &config.ledger,
        );

        let started_at = clock.now();
        Ok(Self {
            chain,
            targets,
            tracker,
            recommender: RecommendationEngine::from_config(&config.timing),
            coordinator,
            listener,
            clock,
            read_timeout: config.execution.read_timeout(),
            decision: Mutex::new(()),
            state: RwLock::new(EngineState {
                running: false,
                started_at,
                current_target: None,
                last_cycle: CycleKind::Startup,
                last_cycle_at: None,
                last_recommendation: None,
                cycle_errors: 0,
            }),
        })
    }

    /// Close out anything a previous run left in flight
    pub async fn recover(&self) -> Option<SwitchOperation> {
        self.coordinator.recover().await
    }

    /// Checks that must pass before the loops start
    pub async fn startup_check(&self) -> Result<Address, ConfigError> {
        let allowed = self
            .read(self.chain.can_switch())
            .await
            .map_err(|e| ConfigError::StartupRead(e.to_string()))?;
        if !allowed {
            return Err(ConfigError::MissingPermission);
        }

        let current = self
            .read(self.chain.read_current_target())
            .await
            .map_err(|e| ConfigError::StartupRead(e.to_string()))?;
        let configured = self
            .targets
            .get(&current)
            .ok_or_else(|| ConfigError::UnknownCurrentTarget(current.to_string()))?;

        info!("Current target is {} ({})", configured.label, current);

        let mut state = self.state.write().await;
        state.current_target = Some(current.clone());
        state.last_cycle = CycleKind::Startup;
        state.last_cycle_at = Some(self.clock.now());
        Ok(current)
    }

    // ========================================================================
    // Cycles
    // ========================================================================

    /// Poll, record, evaluate, and switch if the verdict says so
    pub async fn run_monitor_cycle(&self) -> CycleOutcome {
        self.begin_cycle(CycleKind::Monitor).await;
        let _decision = match self.decision.try_lock() {
            Ok(guard) => guard,
            Err(_) => return self.busy(CycleKind::Monitor).await,
        };

        let (current, target) = match self.poll_pair(CycleKind::Monitor).await {
            Ok(pair) => pair,
            Err(outcome) => return outcome,
        };

        let recommendation = self.recommender.evaluate(&current, &target);
        self.publish(&recommendation).await;

        match recommendation.verdict {
            Verdict::Switch => {}
            Verdict::Wait => {
                let advice = self.timing_advice(&current.id, &target.id).await;
                debug!("Timing: {}", advice.note);
                return CycleOutcome::Evaluated(recommendation);
            }
            Verdict::NoAction => return CycleOutcome::Evaluated(recommendation),
        }

        self.execute(&current.id, &target.id).await
    }

    /// Forced switch to the other target, on the long cadence
    pub async fn run_rotation_cycle(&self) -> CycleOutcome {
        self.begin_cycle(CycleKind::Rotation).await;
        let _decision = match self.decision.try_lock() {
            Ok(guard) => guard,
            Err(_) => return self.busy(CycleKind::Rotation).await,
        };

        match self.read(self.chain.read_deposit_count()).await {
            Ok(0) => {
                info!("Skipping rotation: no deposits to move");
                return CycleOutcome::NoDeposits;
            }
            Ok(n) => debug!("Rotation will move {} deposits", n),
            Err(e) => return self.skip(CycleKind::Rotation, e).await,
        }

        let (current, target) = match self.poll_pair(CycleKind::Rotation).await {
            Ok(pair) => pair,
            Err(outcome) => return outcome,
        };

        let recommendation = self.recommender.rotation(&current, &target);
        self.publish(&recommendation).await;

        self.execute(&current.id, &target.id).await
    }

    async fn begin_cycle(&self, kind: CycleKind) {
        let mut state = self.state.write().await;
        state.last_cycle = kind;
        state.last_cycle_at = Some(self.clock.now());
    }

    /// Read the current target and both availabilities, feeding the tracker
    async fn poll_pair(&self, kind: CycleKind) -> Result<(TargetStatus, TargetStatus), CycleOutcome> {
        let current_id = match self.read(self.chain.read_current_target()).await {
            Ok(id) => id,
            Err(e) => return Err(self.skip(kind, e).await),
        };
        self.state.write().await.current_target = Some(current_id.clone());

        let (current_spec, target_spec) = match self.pair_for(&current_id) {
            Some(pair) => pair,
            None => {
                warn!("Current target {} is not configured, skipping {} cycle", current_id, kind);
                self.state.write().await.cycle_errors += 1;
                return Err(CycleOutcome::UnknownCurrent(current_id));
            }
        };

        let current_up = match self.read(self.chain.read_availability(&current_spec.address)).await {
            Ok(v) => v,
            Err(e) => return Err(self.skip(kind, e).await),
        };
        let target_up = match self.read(self.chain.read_availability(&target_spec.address)).await {
            Ok(v) => v,
            Err(e) => return Err(self.skip(kind, e).await),
        };

        let now = self.clock.now();
        self.tracker.observe(&current_spec.address, current_up, now).await;
        self.tracker.observe(&target_spec.address, target_up, now).await;

        Ok((
            TargetStatus::new(current_spec.address.clone(), &current_spec.label, current_up, now),
            TargetStatus::new(target_spec.address.clone(), &target_spec.label, target_up, now),
        ))
    }

    fn pair_for(&self, current: &Address) -> Option<(&TargetSpec, &TargetSpec)> {
        Some((self.targets.get(current)?, self.targets.other(current)?))
    }

    async fn execute(&self, current: &Address, target: &Address) -> CycleOutcome {
        if current == target {
            return CycleOutcome::AlreadyAtTarget(target.clone());
        }
        match self.coordinator.execute(target).await {
            Ok(op) => {
                if op.status == OperationStatus::Completed {
                    self.state.write().await.current_target = Some(target.clone());
                }
                CycleOutcome::Executed(op)
            }
            Err(SwitchError::AlreadyInFlight(id)) => {
                debug!("Switch to {} skipped: {} in flight", target, id);
                CycleOutcome::Busy(id)
            }
        }
    }

    async fn publish(&self, recommendation: &Recommendation) {
        self.listener.on_recommendation(recommendation);
        self.state.write().await.last_recommendation = Some(recommendation.clone());
    }

    async fn busy(&self, kind: CycleKind) -> CycleOutcome {
        let holder = match self.coordinator.in_flight().await {
            Some(op) => op.id,
            None => "another cycle is deciding".to_string(),
        };
        debug!("Skipping {} cycle: {}", kind, holder);
        CycleOutcome::Busy(holder)
    }

    async fn skip(&self, kind: CycleKind, err: ChainError) -> CycleOutcome {
        warn!("Skipping {} cycle: {}", kind, err);
        self.state.write().await.cycle_errors += 1;
        CycleOutcome::Skipped(err.to_string())
    }

    async fn read<T, F>(&self, fut: F) -> Result<T, ChainError>
    where
        F: Future<Output = Result<T, ChainError>>,
    {
        match timeout(self.read_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ChainError::Read(format!(
                "no answer within {:?}",
                self.read_timeout
            ))),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Advisory timing report for a current/candidate pair
    pub async fn timing_advice(&self, current: &Address, target: &Address) -> TimingAdvice {
        let current_analysis = predictor::analyze(&self.tracker.history(current).await);
        let target_analysis = predictor::analyze(&self.tracker.history(target).await);
        self.recommender
            .timing_advice(current_analysis, target_analysis, self.clock.now())
    }

    pub async fn status(&self) -> EngineStatus {
        let state = self.state.read().await;
        EngineStatus {
            version: VERSION.to_string(),
            running: state.running,
            started_at: state.started_at,
            current_target: state.current_target.clone(),
            last_cycle: state.last_cycle,
            last_cycle_at: state.last_cycle_at,
            last_recommendation: state.last_recommendation.clone(),
            in_flight: self.coordinator.in_flight().await,
            recent_operations: self.coordinator.recent(STATUS_RECENT_OPS).await,
            ledger: self.coordinator.summary().await,
            cycle_errors: state.cycle_errors,
        }
    }

    pub async fn daily_summary(&self, date: NaiveDate) -> DailySummary {
        let ops = self.coordinator.ledger().await;
        DailySummary::from_operations(&ops, date)
    }

    pub async fn set_running(&self, running: bool) {
        self.state.write().await.running = running;
    }

    pub fn targets(&self) -> &TargetPair {
        &self.targets
    }

    pub fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    pub fn coordinator(&self) -> &ExecutionCoordinator {
        &self.coordinator
    }
}
