//! AutoMine daemon library - exposes modules for the binary and for testing.

pub mod chain;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod events;
pub mod gateway;
pub mod predictor;
pub mod recommender;
pub mod scheduler;
pub mod store;
pub mod tracker;

pub use chain::{ChainClient, Confirmation, FakeChainClient, FakeChainClientBuilder, FakeSubmit, TxHandle};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, TargetPair, TargetSpec};
pub use coordinator::{ExecutionCoordinator, RetryPolicy};
pub use engine::{CycleOutcome, SwitchEngine};
pub use error::{ChainError, ConfigError, StoreError, SwitchError};
pub use events::{EngineListener, FanoutListener, RecordingListener, StoreListener, TracingListener};
pub use gateway::HttpChainClient;
pub use scheduler::{IntervalTicker, ManualTicker, Scheduler, TickHandle, Ticker};
pub use store::{JsonFileStore, MemoryStore, StateStore};
pub use tracker::StatusTracker;
