use crate::config::ExplorerRailConfig;
use crate::domain::address::is_valid_native_address;
use crate::domain::ports::{Dispatch, RailError, RailResult, SettlementRail};
use crate::domain::record::RailKind;
use crate::infrastructure::rails::transport_error;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct BalanceReply {
    balance: Decimal,
}

#[derive(Debug, Deserialize)]
struct TransactionReply {
    transaction: TransactionBody,
}

#[derive(Debug, Deserialize)]
struct TransactionBody {
    #[serde(default)]
    confirmations: u32,
}

#[derive(Debug, Deserialize)]
struct AddressTransactionsReply {
    #[serde(default)]
    transactions: Vec<AddressTransaction>,
}

#[derive(Debug, Deserialize)]
struct AddressTransaction {
    hash: String,
    #[serde(default)]
    value: Decimal,
    #[serde(rename = "type", default)]
    direction: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PayoutReply {
    txid: String,
}

/// Rail backed by a dogechain-style block-explorer REST API.
///
/// Unlike the node rail it has no wallet session to establish, so
/// availability is purely a configuration flag; each call carries the
/// configured request timeout.
pub struct ExplorerRail {
    config: ExplorerRailConfig,
    http: reqwest::Client,
}

impl ExplorerRail {
    pub fn new(config: ExplorerRailConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self { config, http }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    fn explorer_url(&self, txid: &str) -> String {
        format!("https://dogechain.info/tx/{txid}")
    }
}

#[async_trait]
impl SettlementRail for ExplorerRail {
    fn kind(&self) -> RailKind {
        RailKind::ExplorerApi
    }

    fn network(&self) -> &str {
        "mainnet"
    }

    async fn is_available(&self) -> bool {
        self.config.enabled
    }

    fn validate_address(&self, address: &str) -> bool {
        is_valid_native_address(address)
    }

    async fn get_balance(&self, address: &str) -> RailResult<Decimal> {
        let reply: BalanceReply = self
            .http
            .get(self.url(&format!("address/balance/{address}")))
            .send()
            .await
            .map_err(transport_error)?
            .error_for_status()
            .map_err(|e| RailError::Protocol(e.to_string()))?
            .json()
            .await
            .map_err(transport_error)?;
        Ok(reply.balance.round_dp(8))
    }

    async fn send(&self, to_address: &str, amount: Decimal) -> RailResult<Dispatch> {
        if !self.validate_address(to_address) {
            return Err(RailError::InvalidAddress(to_address.to_string()));
        }

        let response = self
            .http
            .post(self.url("payout"))
            .json(&json!({ "to_address": to_address, "amount": amount }))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == reqwest::StatusCode::PAYMENT_REQUIRED {
            return Err(RailError::InsufficientLiquidity);
        }
        let reply: PayoutReply = response
            .error_for_status()
            .map_err(|e| RailError::Protocol(e.to_string()))?
            .json()
            .await
            .map_err(transport_error)?;

        tracing::info!(txid = %reply.txid, to = to_address, %amount, "broadcast via explorer api");
        Ok(Dispatch {
            explorer_url: Some(self.explorer_url(&reply.txid)),
            tx_hash: reply.txid,
        })
    }

    async fn get_confirmations(&self, tx_hash: &str) -> RailResult<u32> {
        let response = self
            .http
            .get(self.url(&format!("transaction/{tx_hash}")))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RailError::Dropped(tx_hash.to_string()));
        }
        let reply: TransactionReply = response
            .error_for_status()
            .map_err(|e| RailError::Protocol(e.to_string()))?
            .json()
            .await
            .map_err(transport_error)?;
        Ok(reply.transaction.confirmations)
    }

    async fn find_dispatched(
        &self,
        to_address: &str,
        amount: Decimal,
    ) -> RailResult<Option<Dispatch>> {
        let reply: AddressTransactionsReply = self
            .http
            .get(self.url(&format!("address/transactions/{to_address}")))
            .send()
            .await
            .map_err(transport_error)?
            .error_for_status()
            .map_err(|e| RailError::Protocol(e.to_string()))?
            .json()
            .await
            .map_err(transport_error)?;

        let found = reply.transactions.into_iter().find(|tx| {
            tx.direction.as_deref() == Some("received")
                && tx.value.round_dp(8) == amount.round_dp(8)
        });
        Ok(found.map(|tx| Dispatch {
            explorer_url: Some(self.explorer_url(&tx.hash)),
            tx_hash: tx.hash,
        }))
    }

    async fn estimate_fee(&self) -> RailResult<Decimal> {
        // The explorer API exposes no fee endpoint; use the network-standard
        // flat fee.
        Ok(Decimal::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rail(enabled: bool) -> ExplorerRail {
        ExplorerRail::new(ExplorerRailConfig {
            enabled,
            api_url: "https://dogechain.info/api/v1/".into(),
            timeout_secs: 10,
        })
    }

    #[tokio::test]
    async fn test_availability_follows_config() {
        assert!(rail(true).is_available().await);
        assert!(!rail(false).is_available().await);
    }

    #[test]
    fn test_url_joining_strips_trailing_slash() {
        let r = rail(true);
        assert_eq!(
            r.url("address/balance/D123"),
            "https://dogechain.info/api/v1/address/balance/D123"
        );
    }

    #[test]
    fn test_reply_parsing() {
        let balance: BalanceReply = serde_json::from_str(r#"{"balance":"123.45"}"#).unwrap();
        assert_eq!(balance.balance, dec!(123.45));

        let tx: TransactionReply =
            serde_json::from_str(r#"{"transaction":{"hash":"ab","confirmations":4}}"#).unwrap();
        assert_eq!(tx.transaction.confirmations, 4);

        let listing: AddressTransactionsReply = serde_json::from_str(
            r#"{"transactions":[{"hash":"ab","value":"39","type":"received"}]}"#,
        )
        .unwrap();
        assert_eq!(listing.transactions.len(), 1);
        assert_eq!(listing.transactions[0].value, dec!(39));
    }

    #[tokio::test]
    async fn test_validate_address_rejects_token_format() {
        let r = rail(true);
        assert!(r.validate_address("DH5yaieqoZN36fDVciNyRueRGvGLR3mr7L"));
        assert!(!r.validate_address("0x742d35Cc6634C0532925a3b844Bc454e4438f44e"));
    }
}
