//! Cadences for the monitor and rotation cycles.
//!
//! Each cadence is its own task. Interval ticks missed while a cycle runs are
//! skipped, never queued. Shutdown lets a running cycle finish, including any
//! switch it started.

use async_trait::async_trait;
use automine_shared::CycleKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::engine::{CycleOutcome, SwitchEngine};

#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick. `None` means the ticker is finished.
    async fn tick(&mut self) -> Option<()>;
}

// ============================================================================
// Tickers
// ============================================================================

/// Fires every `period`, the first time one period after creation
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> Option<()> {
        self.interval.tick().await;
        Some(())
    }
}

/// Ticker driven by a [`TickHandle`]
pub struct ManualTicker {
    rx: mpsc::UnboundedReceiver<oneshot::Sender<()>>,
    done: Option<oneshot::Sender<()>>,
}

impl ManualTicker {
    pub fn new() -> (Self, TickHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx, done: None }, TickHandle { tx })
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) -> Option<()> {
        // Asking for the next tick means the previous cycle is over
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
        let ack = self.rx.recv().await?;
        self.done = Some(ack);
        Some(())
    }
}

#[derive(Clone)]
pub struct TickHandle {
    tx: mpsc::UnboundedSender<oneshot::Sender<()>>,
}

impl TickHandle {
    /// Fire one tick and wait for the cycle it starts to finish.
    ///
    /// Returns false if the loop stopped before confirming the cycle.
    pub async fn tick(&self) -> bool {
        match self.fire() {
            Some(done) => done.await.is_ok(),
            None => false,
        }
    }

    /// Fire one tick without waiting
    pub fn fire(&self) -> Option<oneshot::Receiver<()>> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(tx).ok()?;
        Some(rx)
    }
}

// ============================================================================
// Scheduler
// ============================================================================

pub struct Scheduler {
    engine: Arc<SwitchEngine>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    monitor_cycles: Arc<AtomicU64>,
    rotation_cycles: Arc<AtomicU64>,
}

impl Scheduler {
    /// Start both loops on interval tickers from the configuration
    pub async fn from_config(engine: Arc<SwitchEngine>, config: &Config) -> Self {
        let monitor: Box<dyn Ticker> = Box::new(IntervalTicker::new(config.poll_interval()));
        let rotation: Option<Box<dyn Ticker>> = if config.schedule.rotation_enabled {
            Some(Box::new(IntervalTicker::new(config.rotation_interval())))
        } else {
            info!("Scheduled rotation disabled");
            None
        };
        Self::start(engine, monitor, rotation, config.schedule.status_log_every).await
    }

    /// Start the loops. Pass `None` for `rotation` to run monitoring only.
    pub async fn start(
        engine: Arc<SwitchEngine>,
        monitor: Box<dyn Ticker>,
        rotation: Option<Box<dyn Ticker>>,
        status_log_every: u64,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let monitor_cycles = Arc::new(AtomicU64::new(0));
        let rotation_cycles = Arc::new(AtomicU64::new(0));

        engine.set_running(true).await;

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(run_loop(
            CycleKind::Monitor,
            Arc::clone(&engine),
            monitor,
            shutdown_rx.clone(),
            Arc::clone(&monitor_cycles),
            status_log_every,
        )));

        if let Some(rotation) = rotation {
            tasks.push(tokio::spawn(run_loop(
                CycleKind::Rotation,
                Arc::clone(&engine),
                rotation,
                shutdown_rx,
                Arc::clone(&rotation_cycles),
                0,
            )));
        }

        info!("Scheduler started ({} loops)", tasks.len());

        Self {
            engine,
            shutdown_tx,
            tasks,
            monitor_cycles,
            rotation_cycles,
        }
    }

    pub fn monitor_cycles(&self) -> u64 {
        self.monitor_cycles.load(Ordering::SeqCst)
    }

    pub fn rotation_cycles(&self) -> u64 {
        self.rotation_cycles.load(Ordering::SeqCst)
    }

    /// Stop accepting ticks and wait for running cycles to finish
    pub async fn shutdown(self) {
        info!("Scheduler stopping");
        let _ = self.shutdown_tx.send(true);

        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Scheduler loop ended abnormally: {}", e);
            }
        }

        self.engine.coordinator().wait_idle().await;
        self.engine.set_running(false).await;
        info!("Scheduler stopped");
    }
}

async fn run_loop(
    kind: CycleKind,
    engine: Arc<SwitchEngine>,
    mut ticker: Box<dyn Ticker>,
    mut shutdown: watch::Receiver<bool>,
    cycles: Arc<AtomicU64>,
    status_log_every: u64,
) {
    debug!("{} loop started", kind);

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            tick = ticker.tick() => {
                if tick.is_none() {
                    break;
                }
            }
        }

        let outcome = match kind {
            CycleKind::Rotation => engine.run_rotation_cycle().await,
            _ => engine.run_monitor_cycle().await,
        };
        log_outcome(kind, &outcome);

        let n = cycles.fetch_add(1, Ordering::SeqCst) + 1;
        if status_log_every > 0 && n % status_log_every == 0 {
            let status = engine.status().await;
            info!("[STATUS] {}", status.summary_line());
        }
    }

    debug!("{} loop stopped", kind);
}

fn log_outcome(kind: CycleKind, outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Executed(op) => info!(
            "{} cycle finished switch {} to {}: {}",
            kind, op.id, op.target_id, op.status
        ),
        CycleOutcome::Busy(id) => debug!("{} cycle skipped, {} in flight", kind, id),
        CycleOutcome::Evaluated(r) => debug!("{} cycle: {}", kind, r.verdict),
        other => debug!("{} cycle: {:?}", kind, other),
    }
}
