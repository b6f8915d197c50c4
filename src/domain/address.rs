//! Destination address formats understood by the payment rails.
//!
//! Native-chain addresses are base58check, 34 characters, leading `D`
//! (version byte `0x1e`). Wrapped-token addresses are `0x` plus 40 hex digits.

use serde::{Deserialize, Serialize};

/// Dogecoin mainnet P2PKH version byte.
const NATIVE_VERSION_BYTE: u8 = 0x1e;
const NATIVE_ADDRESS_LEN: usize = 34;

/// The syntactic family a destination address belongs to. Rail selection is
/// driven by this, then narrowed by rail availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressFormat {
    /// Base58check native-chain address.
    Native,
    /// `0x`-prefixed 40-hex-digit contract-chain address.
    TokenHex,
}

impl AddressFormat {
    /// Classifies an address string, or `None` if it matches neither format.
    pub fn detect(address: &str) -> Option<Self> {
        if is_valid_native_address(address) {
            Some(Self::Native)
        } else if is_valid_token_address(address) {
            Some(Self::TokenHex)
        } else {
            None
        }
    }
}

/// Full base58check validation: length, leading version byte and checksum.
pub fn is_valid_native_address(address: &str) -> bool {
    if address.len() != NATIVE_ADDRESS_LEN || !address.starts_with('D') {
        return false;
    }
    bs58::decode(address)
        .with_check(Some(NATIVE_VERSION_BYTE))
        .into_vec()
        .is_ok()
}

/// `0x` prefix followed by exactly 40 hex digits.
pub fn is_valid_token_address(address: &str) -> bool {
    match address.strip_prefix("0x") {
        Some(body) => body.len() == 40 && hex::decode(body).is_ok(),
        None => false,
    }
}
