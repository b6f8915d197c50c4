use crate::domain::account::{Account, Amount};
use crate::domain::record::{RailKind, RecordStatus, SettlementRecord, TxKind};
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;

/// Owns per-user balance and daily-limit state.
///
/// `reserve`, `credit` and `release` must each be atomic per account: no two
/// balance mutations for the same account may interleave, and mutations for
/// one account are applied in issue order. Implementations serialize per
/// account key, never with one global lock.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn get_account(&self, user_id: &str) -> Result<Option<Account>>;

    /// Atomic check-and-debit of the available balance plus daily-limit
    /// accounting. Fails with `InsufficientFunds`, `AccountInactive` or
    /// `DailyLimitExceeded`.
    async fn reserve(&self, user_id: &str, amount: Amount) -> Result<()>;

    /// Atomic credit of earnings to the available balance. Creates the
    /// account on first credit.
    async fn credit(&self, user_id: &str, amount: Amount, kind: TxKind) -> Result<()>;

    /// Compensating operation restoring a reservation after a terminal
    /// failure so funds are never stranded.
    async fn release(&self, user_id: &str, amount: Amount) -> Result<()>;

    /// Optional consistency pass over all accounts, zeroing stale daily
    /// counters. Lazy reset inside `reserve`/`credit` remains authoritative.
    /// Returns the number of accounts touched.
    async fn sweep_daily_limits(&self, today: NaiveDate) -> Result<u32>;
}

/// Persisted settlement records. Records are upserted, never deleted.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn store(&self, record: SettlementRecord) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<SettlementRecord>>;
    async fn find_by_tx_hash(&self, tx_hash: &str) -> Result<Option<SettlementRecord>>;
    async fn find_by_status(&self, status: RecordStatus) -> Result<Vec<SettlementRecord>>;
    async fn find_by_user(&self, user_id: &str) -> Result<Vec<SettlementRecord>>;
}

/// Rail-level failure semantics, mapped onto the engine taxonomy at the seam.
#[derive(Error, Debug)]
pub enum RailError {
    /// The rail cannot be reached (connect error, rail disabled). The
    /// request was definitely not broadcast.
    #[error("rail unavailable: {0}")]
    Unavailable(String),
    /// The call exceeded its deadline. The request may or may not have been
    /// broadcast; callers must run the dispatch inquiry before re-sending.
    #[error("rail call timed out: {0}")]
    Timeout(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("insufficient rail-side liquidity")]
    InsufficientLiquidity,
    /// The network no longer knows the transaction.
    #[error("transaction dropped: {0}")]
    Dropped(String),
    #[error("rail protocol error: {0}")]
    Protocol(String),
}

impl From<RailError> for SettlementError {
    fn from(e: RailError) -> Self {
        match e {
            RailError::Unavailable(m) => SettlementError::RailUnavailable(m),
            RailError::Timeout(m) => SettlementError::RailUnavailable(format!("timeout: {m}")),
            RailError::InvalidAddress(m) => SettlementError::InvalidAddress(m),
            RailError::InsufficientLiquidity => SettlementError::InsufficientRailLiquidity,
            RailError::Dropped(_) => SettlementError::DroppedByNetwork,
            RailError::Protocol(m) => SettlementError::Internal(m),
        }
    }
}

pub type RailResult<T> = std::result::Result<T, RailError>;

/// Result of a successful broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub tx_hash: String,
    pub explorer_url: Option<String>,
}

/// Capability interface common to all payment rails.
///
/// A rail wraps one external payment network behind the same four core
/// capabilities: address validation, balance inquiry, broadcast and
/// confirmation tracking.
#[async_trait]
pub trait SettlementRail: Send + Sync {
    fn kind(&self) -> RailKind;

    /// Network label stamped onto records ("mainnet", "testnet", "bsc").
    fn network(&self) -> &str;

    /// True only when configured, enabled and past the connectivity check.
    async fn is_available(&self) -> bool;

    /// Syntactic (and, where the backend supports it, existence) check.
    fn validate_address(&self, address: &str) -> bool;

    async fn get_balance(&self, address: &str) -> RailResult<Decimal>;

    async fn send(&self, to_address: &str, amount: Decimal) -> RailResult<Dispatch>;

    async fn get_confirmations(&self, tx_hash: &str) -> RailResult<u32>;

    /// Idempotence inquiry: looks for an already-broadcast payment matching
    /// `to_address`/`amount`. Used after an ambiguous timeout so the engine
    /// never double-sends. `Ok(None)` means "definitely not broadcast".
    async fn find_dispatched(&self, to_address: &str, amount: Decimal)
    -> RailResult<Option<Dispatch>>;

    /// Current network fee estimate, in native units.
    async fn estimate_fee(&self) -> RailResult<Decimal>;
}

pub type LedgerRef = Arc<dyn Ledger>;
pub type RecordStoreRef = Arc<dyn RecordStore>;
pub type RailRef = Arc<dyn SettlementRail>;
