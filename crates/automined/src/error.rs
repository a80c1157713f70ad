//! Error types for the switching daemon.

use automine_shared::AddressError;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by the chain client
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("read failed: {0}")]
    Read(String),

    #[error("submit failed: {0}")]
    Submit(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("confirmation failed: {0}")]
    Confirmation(String),
}

impl ChainError {
    /// Read errors only cost a cycle; the rest belong to an operation
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Read(_))
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid store key: {0}")]
    InvalidKey(String),
}

/// Startup-only configuration problems
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("target '{name}' has an invalid address: {source}")]
    InvalidTarget { name: String, source: AddressError },

    #[error("primary and secondary targets are the same address: {0}")]
    DuplicateTargets(String),

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    #[error("{0} is too large")]
    TooLarge(&'static str),

    #[error("ledger trim_to ({trim_to}) must be between 1 and cap ({cap})")]
    LedgerLimits { cap: usize, trim_to: usize },

    #[error("current target {0} is not one of the configured targets")]
    UnknownCurrentTarget(String),

    #[error("operator is not allowed to switch targets")]
    MissingPermission,

    #[error("startup check failed: {0}")]
    StartupRead(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SwitchError {
    #[error("switch operation {0} is already in flight")]
    AlreadyInFlight(String),
}
