//! Shared types for the AutoMine switching engine.
//!
//! Plain data only: targets and their availability history, timing analyses,
//! recommendations, switch operations and the bounded operation ledger.
//! Everything here is serializable so the daemon can persist and report it.

pub mod error;
pub mod ledger;
pub mod operation;
pub mod recommendation;
pub mod report;
pub mod status;
pub mod target;
pub mod timing;

pub use error::AddressError;
pub use ledger::{LedgerSummary, OperationLedger};
pub use operation::{OperationStatus, SwitchOperation};
pub use recommendation::{Recommendation, StatusSnapshot, Verdict};
pub use report::{DailySummary, OperationError};
pub use status::{CycleKind, EngineStatus};
pub use target::{Address, StatusHistoryEntry, TargetStatus};
pub use timing::{SwitchWindow, TimingAdvice, TimingAnalysis};

/// Crate version, reported in status snapshots
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default number of transitions kept per target
pub const DEFAULT_HISTORY_CAP: usize = 100;

/// Default ledger capacity before trimming
pub const DEFAULT_LEDGER_CAP: usize = 100;

/// Default ledger size after trimming
pub const DEFAULT_LEDGER_TRIM_TO: usize = 50;
