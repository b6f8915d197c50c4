use crate::error::{Result, SettlementError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration, loaded from a TOML file.
///
/// Every section has sensible defaults so a partial (or empty) file is valid;
/// rails stay disabled unless explicitly enabled.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub withdrawal: WithdrawalPolicy,
    pub retry: RetryPolicy,
    pub monitor: MonitorConfig,
    pub node: NodeRailConfig,
    pub explorer: ExplorerRailConfig,
    pub token: TokenRailConfig,
}

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SettlementError::Validation(format!("cannot read config: {e}")))?;
        toml::from_str(&raw)
            .map_err(|e| SettlementError::Validation(format!("invalid config: {e}")))
    }
}

/// Withdrawal bounds, fees and daily limit.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WithdrawalPolicy {
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    pub fee_fixed: Decimal,
    /// Percentage applied on top of the fixed fee (0 = fixed fee only).
    pub fee_percent: Decimal,
    pub daily_limit: Decimal,
}

impl Default for WithdrawalPolicy {
    fn default() -> Self {
        Self {
            min_amount: dec!(10),
            max_amount: dec!(10000),
            fee_fixed: dec!(1),
            fee_percent: Decimal::ZERO,
            daily_limit: dec!(50000),
        }
    }
}

impl WithdrawalPolicy {
    /// `fee_fixed + amount * fee_percent / 100`, rounded to 8 decimal places.
    pub fn fee_for(&self, amount: Decimal) -> Decimal {
        (self.fee_fixed + amount * self.fee_percent / dec!(100)).round_dp(8)
    }
}

/// Dispatch retry behavior. `max_attempts` counts `send` calls, so a value of
/// 3 allows two transient failures before the record goes to `failed`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: base delay doubling per completed attempt, capped.
    pub fn backoff_ms(&self, retries: u32) -> u64 {
        let exp = retries.saturating_sub(1).min(16);
        (self.base_delay_ms << exp).min(self.max_delay_ms)
    }
}

/// Confirmation polling loop settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    pub poll_interval_secs: u64,
    /// Polls per record before it is surfaced for operator inspection.
    pub max_poll_attempts: u32,
    pub min_confirmations: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 15,
            max_poll_attempts: 20,
            min_confirmations: 6,
        }
    }
}

/// Dogecoin Core node RPC settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeRailConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub network: String,
    pub timeout_secs: u64,
}

impl Default for NodeRailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".into(),
            port: 22555,
            username: "dogecoinrpc".into(),
            password: String::new(),
            network: "mainnet".into(),
            timeout_secs: 10,
        }
    }
}

/// Block-explorer REST API settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExplorerRailConfig {
    pub enabled: bool,
    pub api_url: String,
    pub timeout_secs: u64,
}

impl Default for ExplorerRailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://dogechain.info/api/v1".into(),
            timeout_secs: 10,
        }
    }
}

/// Wrapped-token contract rail (EVM JSON-RPC) settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TokenRailConfig {
    pub enabled: bool,
    pub rpc_url: String,
    pub contract_address: String,
    /// Address holding the payout liquidity; also the `from` of transfers.
    pub treasury_address: String,
    pub timeout_secs: u64,
}

impl Default for TokenRailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rpc_url: "https://bsc-dataseed.binance.org/".into(),
            contract_address: String::new(),
            treasury_address: String::new(),
            timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_policy() {
        let s = Settings::default();
        assert_eq!(s.withdrawal.min_amount, dec!(10));
        assert_eq!(s.withdrawal.max_amount, dec!(10000));
        assert_eq!(s.withdrawal.daily_limit, dec!(50000));
        assert_eq!(s.monitor.min_confirmations, 6);
        assert!(!s.node.enabled);
    }

    #[test]
    fn test_fee_fixed_only() {
        let p = WithdrawalPolicy::default();
        assert_eq!(p.fee_for(dec!(40)), dec!(1));
    }

    #[test]
    fn test_fee_with_percent() {
        let p = WithdrawalPolicy {
            fee_percent: dec!(2),
            ..Default::default()
        };
        // 1 fixed + 2% of 100
        assert_eq!(p.fee_for(dec!(100)), dec!(3));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let r = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 4_000,
        };
        assert_eq!(r.backoff_ms(1), 1_000);
        assert_eq!(r.backoff_ms(2), 2_000);
        assert_eq!(r.backoff_ms(3), 4_000);
        assert_eq!(r.backoff_ms(4), 4_000); // capped
    }

    #[test]
    fn test_parse_partial_toml() {
        let s: Settings = toml::from_str(
            r#"
            [withdrawal]
            min_amount = "5"
            max_amount = "500"

            [node]
            enabled = true
            host = "10.0.0.2"
            "#,
        )
        .unwrap();
        assert_eq!(s.withdrawal.min_amount, dec!(5));
        assert_eq!(s.withdrawal.fee_fixed, dec!(1));
        assert!(s.node.enabled);
        assert_eq!(s.node.port, 22555);
    }
}
