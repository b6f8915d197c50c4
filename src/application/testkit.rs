//! Scriptable rail double shared by the application-layer unit tests.

use crate::domain::address::{is_valid_native_address, is_valid_token_address};
use crate::domain::ports::{Dispatch, RailResult, SettlementRail};
use crate::domain::record::RailKind;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

type SendScript = VecDeque<RailResult<Dispatch>>;

/// A rail whose responses are scripted per call. Unscripted sends succeed
/// with a generated tx hash; unscripted confirmation polls return 0.
pub struct MockRail {
    kind: RailKind,
    available: AtomicBool,
    send_script: Mutex<SendScript>,
    confirmation_script: Mutex<VecDeque<RailResult<u32>>>,
    find_script: Mutex<VecDeque<RailResult<Option<Dispatch>>>>,
    pub send_calls: AtomicU32,
    pub find_calls: AtomicU32,
    balance: Mutex<Decimal>,
}

impl MockRail {
    pub fn new(kind: RailKind) -> Self {
        Self {
            kind,
            available: AtomicBool::new(true),
            send_script: Mutex::new(VecDeque::new()),
            confirmation_script: Mutex::new(VecDeque::new()),
            find_script: Mutex::new(VecDeque::new()),
            send_calls: AtomicU32::new(0),
            find_calls: AtomicU32::new(0),
            balance: Mutex::new(Decimal::new(1_000_000, 0)),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn script_send(&self, result: RailResult<Dispatch>) {
        self.send_script.lock().unwrap().push_back(result);
    }

    pub fn script_confirmations(&self, result: RailResult<u32>) {
        self.confirmation_script.lock().unwrap().push_back(result);
    }

    pub fn script_find(&self, result: RailResult<Option<Dispatch>>) {
        self.find_script.lock().unwrap().push_back(result);
    }

    pub fn sends(&self) -> u32 {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn dispatch(tx_hash: &str) -> Dispatch {
        Dispatch {
            tx_hash: tx_hash.to_string(),
            explorer_url: Some(format!("https://example.org/tx/{tx_hash}")),
        }
    }
}

#[async_trait]
impl SettlementRail for MockRail {
    fn kind(&self) -> RailKind {
        self.kind
    }

    fn network(&self) -> &str {
        match self.kind {
            RailKind::TokenContract => "bsc",
            _ => "mainnet",
        }
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn validate_address(&self, address: &str) -> bool {
        match self.kind {
            RailKind::TokenContract => is_valid_token_address(address),
            _ => is_valid_native_address(address),
        }
    }

    async fn get_balance(&self, _address: &str) -> RailResult<Decimal> {
        Ok(*self.balance.lock().unwrap())
    }

    async fn send(&self, _to_address: &str, _amount: Decimal) -> RailResult<Dispatch> {
        let n = self.send_calls.fetch_add(1, Ordering::SeqCst);
        match self.send_script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(Self::dispatch(&format!("mock-tx-{n}"))),
        }
    }

    async fn get_confirmations(&self, _tx_hash: &str) -> RailResult<u32> {
        match self.confirmation_script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(0),
        }
    }

    async fn find_dispatched(
        &self,
        _to_address: &str,
        _amount: Decimal,
    ) -> RailResult<Option<Dispatch>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        match self.find_script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(None),
        }
    }

    async fn estimate_fee(&self) -> RailResult<Decimal> {
        Ok(Decimal::ONE)
    }
}
