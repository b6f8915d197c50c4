use crate::config::TokenRailConfig;
use crate::domain::address::is_valid_token_address;
use crate::domain::ports::{Dispatch, RailError, RailResult, SettlementRail};
use crate::domain::record::RailKind;
use crate::infrastructure::rails::transport_error;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

/// ERC-20 `balanceOf(address)` selector.
const SELECTOR_BALANCE_OF: &str = "70a08231";
/// ERC-20 `transfer(address,uint256)` selector.
const SELECTOR_TRANSFER: &str = "a9059cbb";
/// The wrapped token uses the standard 18 decimals.
const WEI_PER_TOKEN: u128 = 1_000_000_000_000_000_000;

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

/// Rail paying out through a wrapped-token ERC-20 contract over EVM JSON-RPC.
///
/// Transfers are signed by the node-managed treasury account
/// (`eth_sendTransaction`); confirmations are the distance between the chain
/// head and the block the transfer landed in.
pub struct TokenRail {
    config: TokenRailConfig,
    http: reqwest::Client,
    initialized: bool,
}

impl TokenRail {
    pub fn new(config: TokenRailConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("reqwest client construction cannot fail with static options");

        // A rail without a valid contract and treasury cannot pay anyone;
        // leave it unavailable rather than failing every send.
        let initialized = is_valid_token_address(&config.contract_address)
            && is_valid_token_address(&config.treasury_address);
        if config.enabled && !initialized {
            tracing::error!("token rail misconfigured (contract or treasury address invalid)");
        }

        Self {
            config,
            http,
            initialized,
        }
    }

    async fn rpc(&self, method: &str, params: Value) -> RailResult<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .http
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let parsed: RpcResponse = response.json().await.map_err(transport_error)?;
        if let Some(err) = parsed.error {
            return Err(RailError::Protocol(format!(
                "rpc error {}: {}",
                err.code, err.message
            )));
        }
        parsed
            .result
            .ok_or_else(|| RailError::Protocol("rpc response missing result".to_string()))
    }

    async fn block_number(&self) -> RailResult<u64> {
        let result = self.rpc("eth_blockNumber", json!([])).await?;
        result
            .as_str()
            .and_then(parse_hex_u64)
            .ok_or_else(|| RailError::Protocol("malformed block number".to_string()))
    }
}

/// Converts a token amount to its 18-decimal integer representation.
pub(crate) fn to_wei(amount: Decimal) -> Option<u128> {
    let scaled = amount * Decimal::from_u128(WEI_PER_TOKEN)?;
    scaled.trunc().to_u128()
}

/// Converts an 18-decimal integer back to a token amount, 8 dp.
pub(crate) fn from_wei(wei: u128) -> Option<Decimal> {
    let whole = Decimal::from_u128(wei / WEI_PER_TOKEN)?;
    let frac = Decimal::from_u128(wei % WEI_PER_TOKEN)? / Decimal::from_u128(WEI_PER_TOKEN)?;
    Some((whole + frac).round_dp(8))
}

fn parse_hex_u64(s: &str) -> Option<u64> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16).ok()
}

fn parse_hex_u128(s: &str) -> Option<u128> {
    let body = s.trim_start_matches("0x");
    // Reject balances beyond u128; nobody holds 3.4e20 tokens.
    let trimmed = body.trim_start_matches('0');
    if trimmed.len() > 32 {
        return None;
    }
    if trimmed.is_empty() {
        return Some(0);
    }
    u128::from_str_radix(trimmed, 16).ok()
}

/// 32-byte left-padded ABI word for an address.
fn abi_address(address: &str) -> String {
    format!("{:0>64}", address.trim_start_matches("0x").to_lowercase())
}

/// 32-byte left-padded ABI word for an unsigned integer.
fn abi_uint(value: u128) -> String {
    format!("{value:064x}")
}

pub(crate) fn balance_of_calldata(owner: &str) -> String {
    format!("0x{SELECTOR_BALANCE_OF}{}", abi_address(owner))
}

pub(crate) fn transfer_calldata(to: &str, wei: u128) -> String {
    format!("0x{SELECTOR_TRANSFER}{}{}", abi_address(to), abi_uint(wei))
}

#[async_trait]
impl SettlementRail for TokenRail {
    fn kind(&self) -> RailKind {
        RailKind::TokenContract
    }

    fn network(&self) -> &str {
        "bsc"
    }

    async fn is_available(&self) -> bool {
        self.config.enabled && self.initialized
    }

    fn validate_address(&self, address: &str) -> bool {
        is_valid_token_address(address)
    }

    async fn get_balance(&self, address: &str) -> RailResult<Decimal> {
        if !self.validate_address(address) {
            return Err(RailError::InvalidAddress(address.to_string()));
        }
        let result = self
            .rpc(
                "eth_call",
                json!([
                    {
                        "to": self.config.contract_address,
                        "data": balance_of_calldata(address),
                    },
                    "latest"
                ]),
            )
            .await?;
        let wei = result
            .as_str()
            .and_then(parse_hex_u128)
            .ok_or_else(|| RailError::Protocol("malformed balance word".to_string()))?;
        from_wei(wei).ok_or_else(|| RailError::Protocol("balance out of range".to_string()))
    }

    async fn send(&self, to_address: &str, amount: Decimal) -> RailResult<Dispatch> {
        if !self.validate_address(to_address) {
            return Err(RailError::InvalidAddress(to_address.to_string()));
        }

        let treasury_balance = self.get_balance(&self.config.treasury_address).await?;
        if treasury_balance < amount {
            return Err(RailError::InsufficientLiquidity);
        }

        let wei = to_wei(amount)
            .ok_or_else(|| RailError::Protocol(format!("amount not representable: {amount}")))?;
        let result = self
            .rpc(
                "eth_sendTransaction",
                json!([{
                    "from": self.config.treasury_address,
                    "to": self.config.contract_address,
                    "data": transfer_calldata(to_address, wei),
                }]),
            )
            .await?;
        let tx_hash = result
            .as_str()
            .ok_or_else(|| RailError::Protocol("eth_sendTransaction returned no hash".to_string()))?
            .to_string();

        tracing::info!(%tx_hash, to = to_address, %amount, "broadcast via token contract");
        Ok(Dispatch {
            explorer_url: Some(format!("https://bscscan.com/tx/{tx_hash}")),
            tx_hash,
        })
    }

    async fn get_confirmations(&self, tx_hash: &str) -> RailResult<u32> {
        let tx = self
            .rpc("eth_getTransactionByHash", json!([tx_hash]))
            .await?;
        if tx.is_null() {
            // The mempool no longer knows it and it never made a block.
            return Err(RailError::Dropped(tx_hash.to_string()));
        }
        let mined_block = tx.get("blockNumber").and_then(Value::as_str);
        let Some(mined_block) = mined_block.and_then(parse_hex_u64) else {
            return Ok(0); // still pending
        };
        let head = self.block_number().await?;
        Ok(head.saturating_sub(mined_block) as u32)
    }

    async fn find_dispatched(
        &self,
        _to_address: &str,
        _amount: Decimal,
    ) -> RailResult<Option<Dispatch>> {
        // No cheap per-recipient transfer index over plain JSON-RPC, so the
        // inquiry is inconclusive; the engine treats an error as "do not
        // resend".
        Err(RailError::Protocol(
            "token rail cannot enumerate past transfers".to_string(),
        ))
    }

    async fn estimate_fee(&self) -> RailResult<Decimal> {
        let result = self.rpc("eth_gasPrice", json!([])).await?;
        let gas_price_wei = result
            .as_str()
            .and_then(parse_hex_u128)
            .ok_or_else(|| RailError::Protocol("malformed gas price".to_string()))?;
        // Standard ERC-20 transfer gas budget.
        let fee_wei = gas_price_wei.saturating_mul(100_000);
        from_wei(fee_wei).ok_or_else(|| RailError::Protocol("fee out of range".to_string()))
    }
}
