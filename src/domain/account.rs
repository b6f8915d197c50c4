use crate::error::{Result, SettlementError};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A positive monetary amount with 8-decimal-place precision.
///
/// Wrapper around `rust_decimal::Decimal` enforcing positivity at the edge so
/// the ledger never sees zero or negative movements. Deserialization goes
/// through the same check, so serde input cannot smuggle a non-positive value
/// past the constructor.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value.round_dp(8)))
        } else {
            Err(SettlementError::Validation(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = SettlementError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
}

/// Per-user balance counters. All values are non-negative decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Balances {
    pub available: Decimal,
    pub pending: Decimal,
    pub total_earned: Decimal,
    pub total_withdrawn: Decimal,
}

/// Daily withdrawal limit state. `last_reset` is the calendar day the
/// counters were last zeroed; the reset is lazy (first touch on a new day).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub daily_withdrawal_limit: Decimal,
    pub daily_withdrawn: Decimal,
    pub today_earned: Decimal,
    pub last_reset: NaiveDate,
}

/// The ledger's unit of ownership: one user's balances and limits.
///
/// All mutation goes through `reserve`/`credit`/`release`, which the ledger
/// store applies under a per-account lock. Invariant: `available >= 0` after
/// any sequence of operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub balance: Balances,
    pub limits: Limits,
    pub status: AccountStatus,
}

impl Account {
    pub fn new(user_id: impl Into<String>, daily_limit: Decimal, today: NaiveDate) -> Self {
        Self {
            user_id: user_id.into(),
            balance: Balances::default(),
            limits: Limits {
                daily_withdrawal_limit: daily_limit,
                daily_withdrawn: Decimal::ZERO,
                today_earned: Decimal::ZERO,
                last_reset: today,
            },
            status: AccountStatus::Active,
        }
    }

    /// Lazy daily reset: zeroes the day counters the first time the account
    /// is touched on a new calendar day.
    pub fn roll_day(&mut self, today: NaiveDate) -> bool {
        if self.limits.last_reset < today {
            self.limits.daily_withdrawn = Decimal::ZERO;
            self.limits.today_earned = Decimal::ZERO;
            self.limits.last_reset = today;
            true
        } else {
            false
        }
    }

    /// Atomically reserves `amount` for withdrawal.
    ///
    /// Checks status, available balance and the daily limit (after the lazy
    /// reset), then decrements `available` and bumps the withdrawal counters.
    pub fn reserve(&mut self, amount: Amount, today: NaiveDate) -> Result<()> {
        self.roll_day(today);

        if self.status != AccountStatus::Active {
            return Err(SettlementError::AccountInactive);
        }
        let value = amount.value();
        if self.balance.available < value {
            return Err(SettlementError::InsufficientFunds);
        }
        if self.limits.daily_withdrawn + value > self.limits.daily_withdrawal_limit {
            return Err(SettlementError::DailyLimitExceeded);
        }

        self.balance.available -= value;
        self.balance.total_withdrawn += value;
        self.limits.daily_withdrawn += value;
        Ok(())
    }

    /// Credits earnings (or refunds/bonuses) to the available balance.
    pub fn credit(&mut self, amount: Amount, today: NaiveDate) {
        self.roll_day(today);
        let value = amount.value();
        self.balance.available += value;
        self.balance.total_earned += value;
        self.limits.today_earned += value;
    }

    /// Compensating operation for a failed withdrawal: puts the reserved
    /// funds back and unwinds the counters bumped by `reserve`.
    pub fn release(&mut self, amount: Amount) {
        let value = amount.value();
        self.balance.available += value;
        self.balance.total_withdrawn = (self.balance.total_withdrawn - value).max(Decimal::ZERO);
        self.limits.daily_withdrawn = (self.limits.daily_withdrawn - value).max(Decimal::ZERO);
    }
}
