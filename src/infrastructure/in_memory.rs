use crate::domain::account::{Account, Amount};
use crate::domain::ports::{Ledger, RecordStore};
use crate::domain::record::{RecordStatus, SettlementRecord, TxKind};
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// In-memory ledger with per-account serialization.
///
/// Each account lives behind its own `Mutex`, keyed in a `DashMap`, so
/// balance mutations for one user are mutually exclusive and ordered while
/// different users proceed in parallel. There is no global lock.
#[derive(Clone)]
pub struct InMemoryLedger {
    accounts: Arc<DashMap<String, Arc<Mutex<Account>>>>,
    default_daily_limit: Decimal,
}

impl InMemoryLedger {
    pub fn new(default_daily_limit: Decimal) -> Self {
        Self {
            accounts: Arc::new(DashMap::new()),
            default_daily_limit,
        }
    }

    /// Inserts a pre-built account (test and bootstrap helper).
    pub fn insert_account(&self, account: Account) {
        self.accounts
            .insert(account.user_id.clone(), Arc::new(Mutex::new(account)));
    }

    fn entry(&self, user_id: &str) -> Option<Arc<Mutex<Account>>> {
        self.accounts.get(user_id).map(|e| e.value().clone())
    }

    fn entry_or_create(&self, user_id: &str, today: NaiveDate) -> Arc<Mutex<Account>> {
        self.accounts
            .entry(user_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Account::new(
                    user_id,
                    self.default_daily_limit,
                    today,
                )))
            })
            .value()
            .clone()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn get_account(&self, user_id: &str) -> Result<Option<Account>> {
        match self.entry(user_id) {
            Some(slot) => Ok(Some(slot.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn reserve(&self, user_id: &str, amount: Amount) -> Result<()> {
        let slot = self
            .entry(user_id)
            .ok_or_else(|| SettlementError::AccountNotFound(user_id.to_string()))?;
        let mut account = slot.lock().await;
        account.reserve(amount, Utc::now().date_naive())
    }

    async fn credit(&self, user_id: &str, amount: Amount, _kind: TxKind) -> Result<()> {
        let today = Utc::now().date_naive();
        let slot = self.entry_or_create(user_id, today);
        let mut account = slot.lock().await;
        account.credit(amount, today);
        Ok(())
    }

    async fn release(&self, user_id: &str, amount: Amount) -> Result<()> {
        let slot = self
            .entry(user_id)
            .ok_or_else(|| SettlementError::AccountNotFound(user_id.to_string()))?;
        let mut account = slot.lock().await;
        account.release(amount);
        Ok(())
    }

    async fn sweep_daily_limits(&self, today: NaiveDate) -> Result<u32> {
        let slots: Vec<Arc<Mutex<Account>>> =
            self.accounts.iter().map(|e| e.value().clone()).collect();
        let mut touched = 0;
        for slot in slots {
            let mut account = slot.lock().await;
            if account.roll_day(today) {
                touched += 1;
            }
        }
        Ok(touched)
    }
}

/// In-memory settlement record store.
#[derive(Default, Clone)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<HashMap<String, SettlementRecord>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn store(&self, record: SettlementRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<SettlementRecord>> {
        let records = self.records.read().await;
        Ok(records.get(id).cloned())
    }

    async fn find_by_tx_hash(&self, tx_hash: &str) -> Result<Option<SettlementRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|r| r.chain.tx_hash.as_deref() == Some(tx_hash))
            .cloned())
    }

    async fn find_by_status(&self, status: RecordStatus) -> Result<Vec<SettlementRecord>> {
        let records = self.records.read().await;
        let mut out: Vec<SettlementRecord> = records
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<SettlementRecord>> {
        let records = self.records.read().await;
        let mut out: Vec<SettlementRecord> = records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}
