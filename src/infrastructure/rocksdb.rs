use crate::domain::account::{Account, Amount};
use crate::domain::ports::{Ledger, RecordStore};
use crate::domain::record::{RecordStatus, SettlementRecord, TxKind};
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for account states.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for settlement records.
pub const CF_RECORDS: &str = "records";

/// Persistent ledger and record store backed by RocksDB.
///
/// Accounts and records live in separate column families, each serialized as
/// JSON. Balance mutations are read-modify-write cycles guarded by a
/// per-account async mutex (one lock per user key, not a database-wide one),
/// which gives the same per-account serialization as the in-memory ledger
/// while surviving process restarts.
///
/// `Clone` shares the underlying `Arc<DB>` and the lock map.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    account_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    default_daily_limit: Decimal,
}

impl RocksDbStore {
    /// Opens or creates the database, ensuring both column families exist.
    pub fn open<P: AsRef<Path>>(path: P, default_daily_limit: Decimal) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_accounts = ColumnFamilyDescriptor::new(CF_ACCOUNTS, Options::default());
        let cf_records = ColumnFamilyDescriptor::new(CF_RECORDS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_accounts, cf_records])?;

        Ok(Self {
            db: Arc::new(db),
            account_locks: Arc::new(DashMap::new()),
            default_daily_limit,
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| SettlementError::Storage(format!("column family {name} not found")))
    }

    fn account_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.account_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    fn read_account(&self, user_id: &str) -> Result<Option<Account>> {
        let cf = self.cf(CF_ACCOUNTS)?;
        match self.db.get_cf(cf, user_id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_account(&self, account: &Account) -> Result<()> {
        let cf = self.cf(CF_ACCOUNTS)?;
        let value = serde_json::to_vec(account)?;
        self.db.put_cf(cf, account.user_id.as_bytes(), value)?;
        Ok(())
    }

    fn scan_records(&self) -> Result<Vec<SettlementRecord>> {
        let cf = self.cf(CF_RECORDS)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) =
                item.map_err(|e| SettlementError::Storage(format!("iteration error: {e}")))?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl Ledger for RocksDbStore {
    async fn get_account(&self, user_id: &str) -> Result<Option<Account>> {
        let lock = self.account_lock(user_id);
        let _guard = lock.lock().await;
        self.read_account(user_id)
    }

    async fn reserve(&self, user_id: &str, amount: Amount) -> Result<()> {
        let lock = self.account_lock(user_id);
        let _guard = lock.lock().await;
        let mut account = self
            .read_account(user_id)?
            .ok_or_else(|| SettlementError::AccountNotFound(user_id.to_string()))?;
        account.reserve(amount, Utc::now().date_naive())?;
        self.write_account(&account)
    }

    async fn credit(&self, user_id: &str, amount: Amount, _kind: TxKind) -> Result<()> {
        let lock = self.account_lock(user_id);
        let _guard = lock.lock().await;
        let today = Utc::now().date_naive();
        let mut account = self
            .read_account(user_id)?
            .unwrap_or_else(|| Account::new(user_id, self.default_daily_limit, today));
        account.credit(amount, today);
        self.write_account(&account)
    }

    async fn release(&self, user_id: &str, amount: Amount) -> Result<()> {
        let lock = self.account_lock(user_id);
        let _guard = lock.lock().await;
        let mut account = self
            .read_account(user_id)?
            .ok_or_else(|| SettlementError::AccountNotFound(user_id.to_string()))?;
        account.release(amount);
        self.write_account(&account)
    }

    async fn sweep_daily_limits(&self, today: NaiveDate) -> Result<u32> {
        let cf = self.cf(CF_ACCOUNTS)?;
        let mut user_ids = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (key, _value) =
                item.map_err(|e| SettlementError::Storage(format!("iteration error: {e}")))?;
            user_ids.push(String::from_utf8_lossy(&key).into_owned());
        }

        let mut touched = 0;
        for user_id in user_ids {
            let lock = self.account_lock(&user_id);
            let _guard = lock.lock().await;
            if let Some(mut account) = self.read_account(&user_id)? {
                if account.roll_day(today) {
                    self.write_account(&account)?;
                    touched += 1;
                }
            }
        }
        Ok(touched)
    }
}

#[async_trait]
impl RecordStore for RocksDbStore {
    async fn store(&self, record: SettlementRecord) -> Result<()> {
        let cf = self.cf(CF_RECORDS)?;
        let value = serde_json::to_vec(&record)?;
        self.db.put_cf(cf, record.id.as_bytes(), value)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<SettlementRecord>> {
        let cf = self.cf(CF_RECORDS)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn find_by_tx_hash(&self, tx_hash: &str) -> Result<Option<SettlementRecord>> {
        Ok(self
            .scan_records()?
            .into_iter()
            .find(|r| r.chain.tx_hash.as_deref() == Some(tx_hash)))
    }

    async fn find_by_status(&self, status: RecordStatus) -> Result<Vec<SettlementRecord>> {
        let mut out: Vec<SettlementRecord> = self
            .scan_records()?
            .into_iter()
            .filter(|r| r.status == status)
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<SettlementRecord>> {
        let mut out: Vec<SettlementRecord> = self
            .scan_records()?
            .into_iter()
            .filter(|r| r.user_id == user_id)
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}
