use thiserror::Error;

pub type Result<T> = std::result::Result<T, SettlementError>;

/// Error taxonomy for the settlement engine.
///
/// Every variant carries a stable machine-readable kind (see [`SettlementError::kind`])
/// which is preserved end-to-end into API payloads. Transient rail failures are
/// retried by the engine; everything else is surfaced immediately.
#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid destination address: {0}")]
    InvalidAddress(String),

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Daily withdrawal limit exceeded")]
    DailyLimitExceeded,

    #[error("Account is not active")]
    AccountInactive,

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Settlement record not found: {0}")]
    RecordNotFound(String),

    #[error("Payment rail unavailable: {0}")]
    RailUnavailable(String),

    #[error("Insufficient liquidity on payment rail")]
    InsufficientRailLiquidity,

    #[error("Transaction dropped by the network")]
    DroppedByNetwork,

    #[error("No payment rail available for this destination")]
    NoRailAvailable,

    #[error("Illegal status transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Settlement error: {0}")]
    Internal(String),
}

impl SettlementError {
    /// Stable identifier for API error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::InvalidAddress(_) => "invalid_address",
            Self::InsufficientFunds => "insufficient_funds",
            Self::DailyLimitExceeded => "daily_limit_exceeded",
            Self::AccountInactive => "account_inactive",
            Self::AccountNotFound(_) => "account_not_found",
            Self::RecordNotFound(_) => "record_not_found",
            Self::RailUnavailable(_) => "rail_unavailable",
            Self::InsufficientRailLiquidity => "insufficient_rail_liquidity",
            Self::DroppedByNetwork => "dropped_by_network",
            Self::NoRailAvailable => "no_rail_available",
            Self::IllegalTransition { .. } => "illegal_transition",
            Self::Storage(_) => "storage_error",
            Self::Internal(_) => "settlement_error",
        }
    }

    /// Whether the engine may retry the operation with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RailUnavailable(_) | Self::InsufficientRailLiquidity
        )
    }
}

impl From<serde_json::Error> for SettlementError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(format!("serialization error: {e}"))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for SettlementError {
    fn from(e: rocksdb::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
