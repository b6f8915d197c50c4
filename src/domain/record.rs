use crate::domain::account::Amount;
use crate::error::{Result, SettlementError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of funds movement a record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Earning,
    Withdrawal,
    Referral,
    Bonus,
    Refund,
}

/// The payment backend a record was (last) dispatched through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RailKind {
    Node,
    ExplorerApi,
    TokenContract,
    Manual,
}

impl std::fmt::Display for RailKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Node => "node",
            Self::ExplorerApi => "explorer_api",
            Self::TokenContract => "token_contract",
            Self::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// Settlement lifecycle status.
///
/// Legal edges: `Pending -> Processing | Failed | Cancelled`,
/// `Processing -> Completed | Failed`, `Failed -> Pending` (explicit retry).
/// `Pending -> Failed` covers failures before any dispatch is attempted
/// (no eligible rail); once dispatch has been attempted the record is
/// `Processing` and can no longer be cancelled. `Completed` and `Cancelled`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl RecordStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    fn can_transition(&self, to: RecordStatus) -> bool {
        use RecordStatus::*;
        matches!(
            (*self, to),
            (Pending, Processing)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Pending)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-chain tracking data for a dispatched record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChainInfo {
    pub tx_hash: Option<String>,
    pub block_height: Option<u64>,
    /// Monotonically non-decreasing while the record is tracked.
    pub confirmations: u32,
    pub explorer_url: Option<String>,
    pub network: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: String,
    pub message: String,
}

/// The durable audit unit for one funds-movement attempt.
///
/// Created `pending` by the engine; mutated only by the engine (dispatch) and
/// the confirmation monitor (terminal updates). Never deleted; failed and
/// cancelled records are retained for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub id: String,
    pub user_id: String,
    pub kind: TxKind,
    pub rail: RailKind,
    pub gross_amount: Decimal,
    pub fee: Decimal,
    pub net_amount: Decimal,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub status: RecordStatus,
    pub chain: ChainInfo,
    pub retries: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub error: Option<ErrorInfo>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

impl SettlementRecord {
    /// Creates a pending withdrawal record. `net_amount = gross - fee` must
    /// be positive.
    pub fn new_withdrawal(
        user_id: impl Into<String>,
        to_address: impl Into<String>,
        gross: Amount,
        fee: Decimal,
        rail: RailKind,
        network: impl Into<String>,
    ) -> Result<Self> {
        let gross_amount = gross.value();
        let net_amount = (gross_amount - fee).round_dp(8);
        if net_amount <= Decimal::ZERO {
            return Err(SettlementError::Validation(
                "Amount does not cover the withdrawal fee".to_string(),
            ));
        }
        Ok(Self {
            id: generate_id("wd"),
            user_id: user_id.into(),
            kind: TxKind::Withdrawal,
            rail,
            gross_amount,
            fee,
            net_amount,
            from_address: None,
            to_address: Some(to_address.into()),
            status: RecordStatus::Pending,
            chain: ChainInfo {
                network: network.into(),
                ..Default::default()
            },
            retries: 0,
            last_retry_at: None,
            error: None,
            created_at: Utc::now(),
            processed_at: None,
            completed_at: None,
        })
    }

    /// Creates an already-completed credit record (earnings, referral
    /// payouts, bonuses, refunds) settled on the manual rail with zero fee.
    pub fn new_credit(user_id: impl Into<String>, amount: Amount, kind: TxKind) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id("cr"),
            user_id: user_id.into(),
            kind,
            rail: RailKind::Manual,
            gross_amount: amount.value(),
            fee: Decimal::ZERO,
            net_amount: amount.value(),
            from_address: None,
            to_address: None,
            status: RecordStatus::Completed,
            chain: ChainInfo::default(),
            retries: 0,
            last_retry_at: None,
            error: None,
            created_at: now,
            processed_at: Some(now),
            completed_at: Some(now),
        }
    }

    /// Moves the record along a legal state-machine edge. Illegal edges are
    /// rejected with `IllegalTransition`, never silently ignored.
    pub fn transition(&mut self, to: RecordStatus) -> Result<()> {
        if !self.status.can_transition(to) {
            return Err(SettlementError::IllegalTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        match to {
            RecordStatus::Processing => self.processed_at = Some(Utc::now()),
            RecordStatus::Completed => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        self.status = to;
        Ok(())
    }

    pub fn mark_failed(&mut self, error: &SettlementError) -> Result<()> {
        self.transition(RecordStatus::Failed)?;
        self.error = Some(ErrorInfo {
            kind: error.kind().to_string(),
            message: error.to_string(),
        });
        Ok(())
    }

    /// Counts one more send attempt that ended in a transient failure.
    pub fn note_retry(&mut self) {
        self.retries += 1;
        self.last_retry_at = Some(Utc::now());
    }

    /// Stores the broadcast result of a successful `send`.
    pub fn record_dispatch(&mut self, tx_hash: String, explorer_url: Option<String>) {
        self.chain.tx_hash = Some(tx_hash);
        self.chain.explorer_url = explorer_url;
    }

    /// Updates the confirmation count, keeping it monotonically
    /// non-decreasing. Returns the effective count.
    pub fn record_confirmations(&mut self, confirmations: u32) -> u32 {
        self.chain.confirmations = self.chain.confirmations.max(confirmations);
        self.chain.confirmations
    }

    /// The amount reserved against the ledger for this record.
    pub fn reserved_amount(&self) -> Result<Amount> {
        Amount::new(self.gross_amount)
    }
}
