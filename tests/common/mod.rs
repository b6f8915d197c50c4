use async_trait::async_trait;
use chrono::Utc;
use dogepay::application::engine::SettlementEngine;
use dogepay::application::selector::RailSelector;
use dogepay::config::{RetryPolicy, WithdrawalPolicy};
use dogepay::domain::account::Account;
use dogepay::domain::address::{is_valid_native_address, is_valid_token_address};
use dogepay::domain::ports::{Dispatch, Ledger, RailError, RailResult, SettlementRail};
use dogepay::domain::record::RailKind;
use dogepay::infrastructure::in_memory::{InMemoryLedger, InMemoryRecordStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

pub const NATIVE_ADDR: &str = "DH5yaieqoZN36fDVciNyRueRGvGLR3mr7L";

/// Rail double for integration tests: queue failures up front, count sends.
pub struct StubRail {
    kind: RailKind,
    available: AtomicBool,
    send_failures: Mutex<VecDeque<RailError>>,
    send_calls: AtomicU32,
}

impl StubRail {
    pub fn new(kind: RailKind) -> Self {
        Self {
            kind,
            available: AtomicBool::new(true),
            send_failures: Mutex::new(VecDeque::new()),
            send_calls: AtomicU32::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn queue_send_failure(&self, e: RailError) {
        self.send_failures.lock().unwrap().push_back(e);
    }

    pub fn send_calls(&self) -> u32 {
        self.send_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SettlementRail for StubRail {
    fn kind(&self) -> RailKind {
        self.kind
    }

    fn network(&self) -> &str {
        "mainnet"
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
        Ok(dec!(1000000))
    }

    async fn send(&self, _to_address: &str, _amount: Decimal) -> RailResult<Dispatch> {
        let n = self.send_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.send_failures.lock().unwrap().pop_front() {
            return Err(e);
        }
        Ok(Dispatch {
            tx_hash: format!("stub-tx-{n}"),
            explorer_url: None,
        })
    }

    async fn get_confirmations(&self, _tx_hash: &str) -> RailResult<u32> {
        Ok(0)
    }

    async fn find_dispatched(
        &self,
        _to_address: &str,
        _amount: Decimal,
    ) -> RailResult<Option<Dispatch>> {
        Ok(None)
    }

    async fn estimate_fee(&self) -> RailResult<Decimal> {
        Ok(Decimal::ONE)
    }
}

pub struct TestContext {
    pub engine: Arc<SettlementEngine>,
    pub ledger: Arc<InMemoryLedger>,
    pub rail: Arc<StubRail>,
}

/// Engine over in-memory stores, one funded account ("u1", 100 available),
/// one node rail, fast retries.
pub fn settlement_context() -> TestContext {
    let ledger = Arc::new(InMemoryLedger::new(dec!(50000)));
    let mut account = Account::new("u1", dec!(50000), Utc::now().date_naive());
    account.balance.available = dec!(100);
    ledger.insert_account(account);

    let rail = Arc::new(StubRail::new(RailKind::Node));
    let engine = Arc::new(SettlementEngine::new(
        ledger.clone(),
        Arc::new(InMemoryRecordStore::new()),
        RailSelector::new(vec![rail.clone() as _]),
        WithdrawalPolicy::default(),
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 4,
        },
        6,
    ));
    TestContext {
        engine,
        ledger,
        rail,
    }
}

pub async fn available(ctx: &TestContext, user_id: &str) -> Decimal {
    ctx.ledger
        .get_account(user_id)
        .await
        .unwrap()
        .unwrap()
        .balance
        .available
}
