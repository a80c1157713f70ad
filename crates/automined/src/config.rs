//! Configuration management for automined.
//!
//! Loads settings from /etc/automine/config.toml. Every field except the two
//! target addresses has a default; targets are validated once at startup.

use anyhow::{Context, Result};
use automine_shared::{Address, DEFAULT_HISTORY_CAP, DEFAULT_LEDGER_CAP, DEFAULT_LEDGER_TRIM_TO};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::ConfigError;

/// Config file path
pub const CONFIG_PATH: &str = "/etc/automine/config.toml";

const SECS_PER_HOUR: u64 = 60 * 60;

/// A configured target as written in the file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetsConfig {
    #[serde(default)]
    pub primary: TargetConfig,
    #[serde(default)]
    pub secondary: TargetConfig,
}

/// Scheduler cadences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Fast monitoring loop interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Forced rotation interval in hours
    #[serde(default = "default_rotation_interval")]
    pub rotation_interval_hours: u64,

    #[serde(default = "default_rotation_enabled")]
    pub rotation_enabled: bool,

    /// Log a status line every N monitor cycles
    #[serde(default = "default_status_every")]
    pub status_log_every: u64,
}

fn default_poll_interval() -> u64 {
    30
}

fn default_rotation_interval() -> u64 {
    24
}

fn default_rotation_enabled() -> bool {
    true
}

fn default_status_every() -> u64 {
    10 // every 5 minutes at the default poll interval
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            rotation_interval_hours: default_rotation_interval(),
            rotation_enabled: default_rotation_enabled(),
            status_log_every: default_status_every(),
        }
    }
}

/// Switch execution limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,

    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,

    /// Bound on every chain read
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    30
}

fn default_submit_timeout() -> u64 {
    30
}

fn default_confirmation_timeout() -> u64 {
    120
}

fn default_read_timeout() -> u64 {
    10
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
            submit_timeout_secs: default_submit_timeout(),
            confirmation_timeout_secs: default_confirmation_timeout(),
            read_timeout_secs: default_read_timeout(),
        }
    }
}

impl ExecutionConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Transitions kept per target
    #[serde(default = "default_history_cap")]
    pub cap: usize,
}

fn default_history_cap() -> usize {
    DEFAULT_HISTORY_CAP
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            cap: default_history_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_cap")]
    pub cap: usize,

    #[serde(default = "default_ledger_trim_to")]
    pub trim_to: usize,
}

fn default_ledger_cap() -> usize {
    DEFAULT_LEDGER_CAP
}

fn default_ledger_trim_to() -> usize {
    DEFAULT_LEDGER_TRIM_TO
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            cap: default_ledger_cap(),
            trim_to: default_ledger_trim_to(),
        }
    }
}

/// Advisory switch-window parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// How soon the current target must be predicted to change
    #[serde(default = "default_horizon")]
    pub horizon_secs: u64,

    /// Lead time before the candidate's predicted change
    #[serde(default = "default_buffer")]
    pub buffer_secs: u64,
}

fn default_horizon() -> u64 {
    60 * 60
}

fn default_buffer() -> u64 {
    30 * 60
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            horizon_secs: default_horizon(),
            buffer_secs: default_buffer(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/automine")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

/// Chain gateway endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_url")]
    pub url: String,
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:8640".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub targets: TargetsConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A validated target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub address: Address,
    pub label: String,
}

/// The two validated candidates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPair {
    pub primary: TargetSpec,
    pub secondary: TargetSpec,
}

impl TargetPair {
    pub fn get(&self, address: &Address) -> Option<&TargetSpec> {
        if &self.primary.address == address {
            Some(&self.primary)
        } else if &self.secondary.address == address {
            Some(&self.secondary)
        } else {
            None
        }
    }

    /// The candidate that is not `current`, if `current` is configured at all
    pub fn other(&self, current: &Address) -> Option<&TargetSpec> {
        if &self.primary.address == current {
            Some(&self.secondary)
        } else if &self.secondary.address == current {
            Some(&self.primary)
        } else {
            None
        }
    }
}

impl Config {
    /// Load config from a specific path
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Check everything that cannot be fixed at runtime
    pub fn validate(&self) -> Result<TargetPair, ConfigError> {
        let pair = self.target_pair()?;

        if self.schedule.poll_interval_secs == 0 {
            return Err(ConfigError::ZeroValue("schedule.poll_interval_secs"));
        }
        if self.schedule.rotation_enabled && self.schedule.rotation_interval_hours == 0 {
            return Err(ConfigError::ZeroValue("schedule.rotation_interval_hours"));
        }
        if self.schedule.rotation_interval_hours.checked_mul(SECS_PER_HOUR).is_none() {
            return Err(ConfigError::TooLarge("schedule.rotation_interval_hours"));
        }
        if self.execution.confirmation_timeout_secs == 0 {
            return Err(ConfigError::ZeroValue("execution.confirmation_timeout_secs"));
        }
        if self.execution.submit_timeout_secs == 0 {
            return Err(ConfigError::ZeroValue("execution.submit_timeout_secs"));
        }
        if self.execution.read_timeout_secs == 0 {
            return Err(ConfigError::ZeroValue("execution.read_timeout_secs"));
        }
        if self.history.cap == 0 {
            return Err(ConfigError::ZeroValue("history.cap"));
        }
        if self.ledger.trim_to == 0 || self.ledger.trim_to > self.ledger.cap {
            return Err(ConfigError::LedgerLimits {
                cap: self.ledger.cap,
                trim_to: self.ledger.trim_to,
            });
        }

        Ok(pair)
    }

    pub fn target_pair(&self) -> Result<TargetPair, ConfigError> {
        let primary = parse_target("primary", &self.targets.primary)?;
        let secondary = parse_target("secondary", &self.targets.secondary)?;

        if primary.address == secondary.address {
            return Err(ConfigError::DuplicateTargets(primary.address.to_string()));
        }

        Ok(TargetPair { primary, secondary })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.poll_interval_secs)
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.rotation_interval_hours.saturating_mul(SECS_PER_HOUR))
    }
}

fn parse_target(name: &str, target: &TargetConfig) -> Result<TargetSpec, ConfigError> {
    let address = Address::parse(&target.address).map_err(|source| ConfigError::InvalidTarget {
        name: name.to_string(),
        source,
    })?;
    let label = if target.label.trim().is_empty() {
        address.short()
    } else {
        target.label.trim().to_string()
    };
    Ok(TargetSpec { address, label })
}
