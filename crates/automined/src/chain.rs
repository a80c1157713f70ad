//! Chain client abstraction.
//!
//! The engine only needs a handful of reads and one write. Key custody, ABI
//! encoding and transport retries live behind this trait.
//!
//! Production code uses `HttpChainClient` (see `gateway.rs`).
//! Test code uses `FakeChainClient` with scripted submit outcomes.

use async_trait::async_trait;
use automine_shared::Address;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::ChainError;

/// Handle of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHandle(pub String);

impl std::fmt::Display for TxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Final result of a mined transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub success: bool,
}

// ============================================================================
// Chain Client Trait
// ============================================================================

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Whether `target` is currently open for mining
    async fn read_availability(&self, target: &Address) -> Result<bool, ChainError>;

    /// The target the managed stake currently sits on
    async fn read_current_target(&self) -> Result<Address, ChainError>;

    /// Number of deposits a switch would move
    async fn read_deposit_count(&self) -> Result<u64, ChainError>;

    /// Whether our operator account may call switch at all
    async fn can_switch(&self) -> Result<bool, ChainError>;

    async fn submit_switch(&self, target: &Address) -> Result<TxHandle, ChainError>;

    async fn await_confirmation(
        &self,
        handle: &TxHandle,
        timeout: Duration,
    ) -> Result<Confirmation, ChainError>;
}

// ============================================================================
// Fake Chain Client (Testing)
// ============================================================================

/// Scripted outcome for one submit/confirm round
#[derive(Debug, Clone, PartialEq)]
pub enum FakeSubmit {
    /// Mined and successful
    Confirm,
    /// Mined but reverted
    Revert,
    /// Submit itself rejected
    RejectSubmit(String),
    /// Receipt lookup failed
    ConfirmationError(String),
    /// Never confirms; the caller's timeout must fire
    Hang,
}

/// Fake chain client for deterministic testing
///
/// ```rust,ignore
/// let fake = FakeChainClientBuilder::new(current.clone())
///     .available(&current, false)
///     .available(&target, true)
///     .submits(vec![FakeSubmit::RejectSubmit("nonce too low".into()), FakeSubmit::Confirm])
///     .build();
/// ```
pub struct FakeChainClient {
    current: Mutex<Address>,
    availability: Mutex<HashMap<Address, bool>>,
    deposits: Mutex<u64>,
    permission: bool,
    failing_reads: Mutex<u32>,
    script: Mutex<VecDeque<FakeSubmit>>,
    default_submit: FakeSubmit,
    confirmation_delay: Option<Duration>,
    availability_delay: Option<Duration>,
    pending: Mutex<HashMap<TxHandle, (Address, FakeSubmit)>>,
    reads: AtomicUsize,
    submits: AtomicUsize,
    confirmations_in_progress: AtomicUsize,
    max_concurrent_confirmations: AtomicUsize,
    submitted_targets: Mutex<Vec<Address>>,
}

impl FakeChainClient {
    pub fn builder(current: Address) -> FakeChainClientBuilder {
        FakeChainClientBuilder::new(current)
    }

    pub fn set_available(&self, target: &Address, available: bool) {
        lock(&self.availability).insert(target.clone(), available);
    }

    pub fn set_current(&self, target: &Address) {
        *lock(&self.current) = target.clone();
    }

    pub fn set_deposits(&self, count: u64) {
        *lock(&self.deposits) = count;
    }

    /// Make the next `n` reads fail with a read error
    pub fn fail_next_reads(&self, n: u32) {
        *lock(&self.failing_reads) = n;
    }

    pub fn push_submit(&self, outcome: FakeSubmit) {
        lock(&self.script).push_back(outcome);
    }

    pub fn read_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    /// Highest number of confirmations awaited at the same time
    pub fn max_concurrent_confirmations(&self) -> usize {
        self.max_concurrent_confirmations.load(Ordering::SeqCst)
    }

    pub fn submitted_targets(&self) -> Vec<Address> {
        lock(&self.submitted_targets).clone()
    }

    fn check_read(&self) -> Result<(), ChainError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut failing = lock(&self.failing_reads);
        if *failing > 0 {
            *failing -= 1;
            return Err(ChainError::Read("fake rpc unavailable".to_string()));
        }
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl ChainClient for FakeChainClient {
    async fn read_availability(&self, target: &Address) -> Result<bool, ChainError> {
        if let Some(delay) = self.availability_delay {
            tokio::time::sleep(delay).await;
        }
        self.check_read()?;
        lock(&self.availability)
            .get(target)
            .copied()
            .ok_or_else(|| ChainError::Read(format!("unknown target {}", target)))
    }

    async fn read_current_target(&self) -> Result<Address, ChainError> {
        self.check_read()?;
        Ok(lock(&self.current).clone())
    }

    async fn read_deposit_count(&self) -> Result<u64, ChainError> {
        self.check_read()?;
        Ok(*lock(&self.deposits))
    }

    async fn can_switch(&self) -> Result<bool, ChainError> {
        self.check_read()?;
        Ok(self.permission)
    }

    async fn submit_switch(&self, target: &Address) -> Result<TxHandle, ChainError> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.submitted_targets).push(target.clone());

        let outcome = lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| self.default_submit.clone());

        if let FakeSubmit::RejectSubmit(msg) = &outcome {
            return Err(ChainError::Submit(msg.clone()));
        }

        let handle = TxHandle(format!("0xfake{:04}", n));
        lock(&self.pending).insert(handle.clone(), (target.clone(), outcome));
        Ok(handle)
    }

    async fn await_confirmation(
        &self,
        handle: &TxHandle,
        _timeout: Duration,
    ) -> Result<Confirmation, ChainError> {
        let in_progress = self.confirmations_in_progress.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_confirmations
            .fetch_max(in_progress, Ordering::SeqCst);

        if let Some(delay) = self.confirmation_delay {
            tokio::time::sleep(delay).await;
        }

        let entry = lock(&self.pending).remove(handle);
        let result = match entry {
            None => Err(ChainError::Confirmation(format!("unknown tx {}", handle))),
            Some((target, outcome)) => match outcome {
                FakeSubmit::Confirm => {
                    *lock(&self.current) = target;
                    Ok(Confirmation { success: true })
                }
                FakeSubmit::Revert => Ok(Confirmation { success: false }),
                FakeSubmit::ConfirmationError(msg) => Err(ChainError::Confirmation(msg)),
                FakeSubmit::Hang => {
                    self.confirmations_in_progress.fetch_sub(1, Ordering::SeqCst);
                    std::future::pending::<()>().await;
                    unreachable!("pending future never resolves")
                }
                FakeSubmit::RejectSubmit(msg) => Err(ChainError::Submit(msg)),
            },
        };

        self.confirmations_in_progress.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ============================================================================
// Builder for FakeChainClient
// ============================================================================

pub struct FakeChainClientBuilder {
    current: Address,
    availability: HashMap<Address, bool>,
    deposits: u64,
    permission: bool,
    script: VecDeque<FakeSubmit>,
    default_submit: FakeSubmit,
    confirmation_delay: Option<Duration>,
    availability_delay: Option<Duration>,
}

impl FakeChainClientBuilder {
    pub fn new(current: Address) -> Self {
        Self {
            current,
            availability: HashMap::new(),
            deposits: 1,
            permission: true,
            script: VecDeque::new(),
            default_submit: FakeSubmit::Confirm,
            confirmation_delay: None,
            availability_delay: None,
        }
    }

    pub fn available(mut self, target: &Address, available: bool) -> Self {
        self.availability.insert(target.clone(), available);
        self
    }

    pub fn deposits(mut self, count: u64) -> Self {
        self.deposits = count;
        self
    }

    pub fn permission(mut self, allowed: bool) -> Self {
        self.permission = allowed;
        self
    }

    /// Outcomes consumed in order by successive submits
    pub fn submits(mut self, outcomes: Vec<FakeSubmit>) -> Self {
        self.script.extend(outcomes);
        self
    }

    /// Outcome used once the script is exhausted
    pub fn default_submit(mut self, outcome: FakeSubmit) -> Self {
        self.default_submit = outcome;
        self
    }

    pub fn confirmation_delay(mut self, delay: Duration) -> Self {
        self.confirmation_delay = Some(delay);
        self
    }

    /// Slow down every availability read, like a lagging RPC node
    pub fn availability_delay(mut self, delay: Duration) -> Self {
        self.availability_delay = Some(delay);
        self
    }

    pub fn build(self) -> FakeChainClient {
        FakeChainClient {
            current: Mutex::new(self.current),
            availability: Mutex::new(self.availability),
            deposits: Mutex::new(self.deposits),
            permission: self.permission,
            failing_reads: Mutex::new(0),
            script: Mutex::new(self.script),
            default_submit: self.default_submit,
            confirmation_delay: self.confirmation_delay,
            availability_delay: self.availability_delay,
            pending: Mutex::new(HashMap::new()),
            reads: AtomicUsize::new(0),
            submits: AtomicUsize::new(0),
            confirmations_in_progress: AtomicUsize::new(0),
            max_concurrent_confirmations: AtomicUsize::new(0),
            submitted_targets: Mutex::new(Vec::new()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: char) -> Address {
        Address::parse(&format!("0x{}", n.to_string().repeat(40))).unwrap()
    }

    #[tokio::test]
    async fn test_fake_reads() {
        let fake = FakeChainClient::builder(addr('1'))
            .available(&addr('1'), true)
            .available(&addr('2'), false)
            .deposits(7)
            .build();

        assert_eq!(fake.read_current_target().await.unwrap(), addr('1'));
        assert!(fake.read_availability(&addr('1')).await.unwrap());
        assert!(!fake.read_availability(&addr('2')).await.unwrap());
        assert_eq!(fake.read_deposit_count().await.unwrap(), 7);
        assert!(fake.can_switch().await.unwrap());
        assert_eq!(fake.read_calls(), 5);
    }

    #[tokio::test]
    async fn test_fake_unknown_target_is_read_error() {
        let fake = FakeChainClient::builder(addr('1')).build();
        let err = fake.read_availability(&addr('3')).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_fake_failing_reads_recover() {
        let fake = FakeChainClient::builder(addr('1')).build();
        fake.fail_next_reads(2);
        assert!(fake.read_current_target().await.is_err());
        assert!(fake.read_current_target().await.is_err());
        assert!(fake.read_current_target().await.is_ok());
    }

    #[tokio::test]
    async fn test_fake_confirm_moves_current() {
        let fake = FakeChainClient::builder(addr('1')).build();
        let handle = fake.submit_switch(&addr('2')).await.unwrap();
        let confirmation = fake
            .await_confirmation(&handle, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(confirmation.success);
        assert_eq!(fake.read_current_target().await.unwrap(), addr('2'));
    }

    #[tokio::test]
    async fn test_fake_script_order() {
        let fake = FakeChainClient::builder(addr('1'))
            .submits(vec![FakeSubmit::RejectSubmit("nonce too low".into()), FakeSubmit::Revert])
            .build();

        let err = fake.submit_switch(&addr('2')).await.unwrap_err();
        assert_eq!(err, ChainError::Submit("nonce too low".into()));

        let handle = fake.submit_switch(&addr('2')).await.unwrap();
        let confirmation = fake
            .await_confirmation(&handle, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!confirmation.success);
        assert_eq!(fake.read_current_target().await.unwrap(), addr('1'));
        assert_eq!(fake.submit_calls(), 2);
    }
}
