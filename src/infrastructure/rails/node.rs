use crate::config::NodeRailConfig;
use crate::domain::address::is_valid_native_address;
use crate::domain::ports::{Dispatch, RailError, RailResult, SettlementRail};
use crate::domain::record::RailKind;
use crate::infrastructure::rails::transport_error;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

// Core wallet RPC error codes.
const RPC_WALLET_INSUFFICIENT_FUNDS: i64 = -6;
const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WalletTransaction {
    #[serde(default)]
    confirmations: i64,
}

#[derive(Debug, Deserialize)]
struct ListedTransaction {
    #[serde(default)]
    txid: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    amount: f64,
}

/// Rail backed by a Dogecoin Core node over authenticated JSON-RPC.
///
/// The control-channel session is probed once at construction
/// (`getblockchaininfo`). If that probe fails the rail stays permanently
/// unavailable for the process lifetime; there is no reconnect loop, a
/// restart is required.
pub struct NodeRail {
    config: NodeRailConfig,
    http: reqwest::Client,
    url: String,
    initialized: AtomicBool,
}

impl NodeRail {
    pub async fn connect(config: NodeRailConfig) -> Self {
        let url = format!("http://{}:{}/", config.host, config.port);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("reqwest client construction cannot fail with static options");

        let rail = Self {
            config,
            http,
            url,
            initialized: AtomicBool::new(false),
        };

        if !rail.config.enabled {
            tracing::info!("node rail disabled by configuration");
            return rail;
        }

        match rail.rpc("getblockchaininfo", json!([])).await {
            Ok(info) => {
                let blocks = info.get("blocks").and_then(Value::as_u64);
                let chain = info.get("chain").and_then(Value::as_str);
                tracing::info!(blocks, chain, "connected to node");
                rail.initialized.store(true, Ordering::SeqCst);
            }
            Err(e) => {
                tracing::error!(error = %e, "node control-channel probe failed; rail stays unavailable");
            }
        }
        rail
    }

    async fn rpc(&self, method: &str, params: Value) -> RailResult<Value> {
        let body = json!({
            "jsonrpc": "1.0",
            "id": "dogepay",
            "method": method,
            "params": params,
        });
        let response = self
            .http
            .post(&self.url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let parsed: RpcResponse = response.json().await.map_err(transport_error)?;
        if let Some(err) = parsed.error {
            return Err(match err.code {
                RPC_WALLET_INSUFFICIENT_FUNDS => RailError::InsufficientLiquidity,
                RPC_INVALID_ADDRESS_OR_KEY => RailError::Dropped(err.message),
                _ => RailError::Protocol(format!("rpc error {}: {}", err.code, err.message)),
            });
        }
        parsed
            .result
            .ok_or_else(|| RailError::Protocol("rpc response missing result".to_string()))
    }

    fn as_rpc_amount(amount: Decimal) -> RailResult<f64> {
        amount
            .to_f64()
            .ok_or_else(|| RailError::Protocol(format!("amount not representable: {amount}")))
    }
}

#[async_trait]
impl SettlementRail for NodeRail {
    fn kind(&self) -> RailKind {
        RailKind::Node
    }

    fn network(&self) -> &str {
        &self.config.network
    }

    async fn is_available(&self) -> bool {
        self.config.enabled && self.initialized.load(Ordering::SeqCst)
    }

    fn validate_address(&self, address: &str) -> bool {
        is_valid_native_address(address)
    }

    async fn get_balance(&self, address: &str) -> RailResult<Decimal> {
        let result = self
            .rpc("getreceivedbyaddress", json!([address, 1]))
            .await?;
        result
            .as_f64()
            .and_then(Decimal::from_f64)
            .map(|d| d.round_dp(8))
            .ok_or_else(|| RailError::Protocol("non-numeric balance".to_string()))
    }

    async fn send(&self, to_address: &str, amount: Decimal) -> RailResult<Dispatch> {
        if !self.validate_address(to_address) {
            return Err(RailError::InvalidAddress(to_address.to_string()));
        }

        // Wallet-wide balance check first so a short wallet surfaces as a
        // liquidity error, not a failed broadcast.
        let wallet_balance = self
            .rpc("getbalance", json!([]))
            .await?
            .as_f64()
            .and_then(Decimal::from_f64)
            .ok_or_else(|| RailError::Protocol("non-numeric wallet balance".to_string()))?;
        if wallet_balance < amount {
            return Err(RailError::InsufficientLiquidity);
        }

        let result = self
            .rpc(
                "sendtoaddress",
                json!([to_address, Self::as_rpc_amount(amount)?]),
            )
            .await?;
        let txid = result
            .as_str()
            .ok_or_else(|| RailError::Protocol("sendtoaddress returned no txid".to_string()))?
            .to_string();

        tracing::info!(%txid, to = to_address, %amount, "broadcast via node");
        Ok(Dispatch {
            explorer_url: Some(format!("https://dogechain.info/tx/{txid}")),
            tx_hash: txid,
        })
    }

    async fn get_confirmations(&self, tx_hash: &str) -> RailResult<u32> {
        let result = self.rpc("gettransaction", json!([tx_hash])).await?;
        let tx: WalletTransaction = serde_json::from_value(result)
            .map_err(|e| RailError::Protocol(format!("malformed gettransaction reply: {e}")))?;
        if tx.confirmations < 0 {
            // Conflicted: the wallet saw the transaction lose to a competing
            // spend.
            return Err(RailError::Dropped(tx_hash.to_string()));
        }
        Ok(tx.confirmations as u32)
    }

    async fn find_dispatched(
        &self,
        to_address: &str,
        amount: Decimal,
    ) -> RailResult<Option<Dispatch>> {
        let result = self.rpc("listtransactions", json!(["*", 100, 0])).await?;
        let listed: Vec<ListedTransaction> = serde_json::from_value(result)
            .map_err(|e| RailError::Protocol(format!("malformed listtransactions reply: {e}")))?;

        // Send entries carry negative amounts in core wallets.
        let found = listed.into_iter().find(|tx| {
            tx.category.as_deref() == Some("send")
                && tx.address.as_deref() == Some(to_address)
                && Decimal::from_f64(tx.amount.abs())
                    .map(|a| a.round_dp(8) == amount.round_dp(8))
                    .unwrap_or(false)
        });

        Ok(found.and_then(|tx| tx.txid).map(|txid| Dispatch {
            explorer_url: Some(format!("https://dogechain.info/tx/{txid}")),
            tx_hash: txid,
        }))
    }

    async fn estimate_fee(&self) -> RailResult<Decimal> {
        let result = self.rpc("estimatesmartfee", json!([2])).await?;
        let rate = result
            .get("feerate")
            .and_then(Value::as_f64)
            .and_then(Decimal::from_f64);
        // The node declines to estimate on a quiet mempool; fall back to the
        // standard relay fee.
        Ok(rate.unwrap_or_else(|| Decimal::new(1, 2)).round_dp(8))
    }
}
