use crate::application::selector::RailSelector;
use crate::config::{RetryPolicy, WithdrawalPolicy};
use crate::domain::account::{Account, Amount};
use crate::domain::address::AddressFormat;
use crate::domain::ports::{
    Ledger, LedgerRef, RailError, RailRef, RecordStore, RecordStoreRef, SettlementRail,
};
use crate::domain::record::{RailKind, RecordStatus, SettlementRecord, TxKind};
use crate::error::{Result, SettlementError};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Fee breakdown returned by [`SettlementEngine::estimate_fee`].
#[derive(Debug, Clone, Serialize)]
pub struct FeeEstimate {
    pub policy_fee: Decimal,
    pub network_fee: Option<Decimal>,
    pub net_amount: Decimal,
}

/// The central coordinator: validation, reservation, rail dispatch,
/// persistence and the confirmation handoff.
///
/// Owns no balance state itself; all funds movement goes through the ledger
/// port, all record state through the record store. Dispatch retries with
/// exponential backoff live here, with the retry counters persisted on the
/// record so they survive a restart.
pub struct SettlementEngine {
    ledger: LedgerRef,
    records: RecordStoreRef,
    selector: RailSelector,
    policy: WithdrawalPolicy,
    retry: RetryPolicy,
    min_confirmations: u32,
    /// Serializes record read-modify-write across concurrent surfaces (the
    /// monitor poll, the webhook and operator commands); the record is
    /// re-read under the lock so a stale clone never overwrites newer state.
    record_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SettlementEngine {
    pub fn new(
        ledger: LedgerRef,
        records: RecordStoreRef,
        selector: RailSelector,
        policy: WithdrawalPolicy,
        retry: RetryPolicy,
        min_confirmations: u32,
    ) -> Self {
        Self {
            ledger,
            records,
            selector,
            policy,
            retry,
            min_confirmations,
            record_locks: DashMap::new(),
        }
    }

    fn record_lock(&self, record_id: &str) -> Arc<Mutex<()>> {
        self.record_locks
            .entry(record_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Takes a withdrawal request through validation, reservation, dispatch
    /// and the monitoring handoff.
    ///
    /// On success the returned record is `processing` with its tx hash set.
    /// Terminal dispatch failures release the reservation and surface as an
    /// error; the failed record is retained for audit and explicit retry.
    pub async fn request_withdrawal(
        &self,
        user_id: &str,
        to_address: &str,
        amount: Decimal,
    ) -> Result<SettlementRecord> {
        let amount = Amount::new(amount)?;
        let gross = amount.value();
        if gross < self.policy.min_amount || gross > self.policy.max_amount {
            return Err(SettlementError::Validation(format!(
                "amount must be between {} and {}",
                self.policy.min_amount, self.policy.max_amount
            )));
        }
        if AddressFormat::detect(to_address).is_none() {
            return Err(SettlementError::InvalidAddress(to_address.to_string()));
        }
        let fee = self.policy.fee_for(gross);
        if gross <= fee {
            return Err(SettlementError::Validation(
                "amount does not cover the withdrawal fee".to_string(),
            ));
        }

        // Eligibility probe before any funds are touched: an address nobody
        // can currently service is rejected without a reservation.
        let rail = self.selector.select(to_address).await?;

        self.ledger.reserve(user_id, amount).await?;

        let record = match SettlementRecord::new_withdrawal(
            user_id,
            to_address,
            amount,
            fee,
            rail.kind(),
            rail.network(),
        ) {
            Ok(record) => record,
            Err(e) => {
                self.ledger.release(user_id, amount).await?;
                return Err(e);
            }
        };
        self.records.store(record.clone()).await?;
        tracing::info!(
            record_id = %record.id,
            user_id,
            %gross,
            %fee,
            "withdrawal accepted"
        );

        self.dispatch(record, self.retry.max_attempts).await
    }

    /// Re-enters dispatch for a failed record. The retry counter is
    /// preserved; the reservation is taken fresh (a failed attempt has
    /// already released it).
    pub async fn retry_withdrawal(&self, record_id: &str) -> Result<SettlementRecord> {
        let lock = self.record_lock(record_id);
        let record = {
            let _guard = lock.lock().await;
            let mut record = self.fetch(record_id).await?;
            if record.status != RecordStatus::Failed {
                return Err(SettlementError::Validation(format!(
                    "only failed records can be retried (status: {})",
                    record.status
                )));
            }
            let amount = record.reserved_amount()?;
            self.ledger.reserve(&record.user_id, amount).await?;

            record.transition(RecordStatus::Pending)?;
            record.error = None;
            self.records.store(record.clone()).await?;
            record
        };
        tracing::info!(record_id = %record.id, retries = record.retries, "retrying withdrawal");

        let ceiling = record.retries + self.retry.max_attempts;
        self.dispatch(record, ceiling).await
    }

    /// Cancels a withdrawal that has not been dispatched yet and releases
    /// its reservation. Once `send` has gone out the record must run to a
    /// terminal state instead.
    pub async fn cancel_withdrawal(&self, record_id: &str) -> Result<SettlementRecord> {
        let lock = self.record_lock(record_id);
        let _guard = lock.lock().await;
        let mut record = self.fetch(record_id).await?;
        record.transition(RecordStatus::Cancelled)?;
        self.records.store(record.clone()).await?;
        self.ledger
            .release(&record.user_id, record.reserved_amount()?)
            .await?;
        tracing::info!(record_id = %record.id, "withdrawal cancelled");
        Ok(record)
    }

    /// Credits earnings (or referral/bonus/refund amounts) and writes the
    /// completed manual-rail audit record.
    pub async fn credit(
        &self,
        user_id: &str,
        amount: Decimal,
        kind: TxKind,
    ) -> Result<SettlementRecord> {
        let amount = Amount::new(amount)?;
        self.ledger.credit(user_id, amount, kind).await?;
        let record = SettlementRecord::new_credit(user_id, amount, kind);
        self.records.store(record.clone()).await?;
        Ok(record)
    }

    /// Policy fee plus, where a rail of the requested kind is available, its
    /// current network fee estimate. Rejects amounts the fee would swallow,
    /// matching what an actual request would do.
    pub async fn estimate_fee(&self, amount: Decimal, rail: Option<RailKind>) -> Result<FeeEstimate> {
        let amount = Amount::new(amount)?.value();
        let policy_fee = self.policy.fee_for(amount);
        if amount <= policy_fee {
            return Err(SettlementError::Validation(
                "amount does not cover the withdrawal fee".to_string(),
            ));
        }
        let mut network_fee = None;
        if let Some(kind) = rail {
            if let Some(rail) = self.selector.by_kind(kind) {
                if rail.is_available().await {
                    network_fee = rail.estimate_fee().await.ok();
                }
            }
        }
        Ok(FeeEstimate {
            policy_fee,
            network_fee,
            net_amount: (amount - policy_fee).round_dp(8),
        })
    }

    pub async fn get_record(&self, record_id: &str) -> Result<SettlementRecord> {
        self.fetch(record_id).await
    }

    pub async fn records_for_user(&self, user_id: &str) -> Result<Vec<SettlementRecord>> {
        self.records.find_by_user(user_id).await
    }

    pub async fn get_account(&self, user_id: &str) -> Result<Option<Account>> {
        self.ledger.get_account(user_id).await
    }

    /// Records currently awaiting confirmations.
    pub async fn processing_records(&self) -> Result<Vec<SettlementRecord>> {
        self.records.find_by_status(RecordStatus::Processing).await
    }

    /// The rail a record was dispatched through, for confirmation polling.
    pub fn rail_for(&self, kind: RailKind) -> Option<RailRef> {
        self.selector.by_kind(kind)
    }

    /// The single confirmation transition shared by the poll loop and the
    /// webhook surface.
    ///
    /// Confirmations never decrease; reaching the configured threshold
    /// completes the record. Updates against terminal records are no-ops so
    /// repeated webhook deliveries stay idempotent.
    pub async fn apply_confirmation_update(
        &self,
        tx_hash: &str,
        confirmations: u32,
    ) -> Result<SettlementRecord> {
        let id = self
            .records
            .find_by_tx_hash(tx_hash)
            .await?
            .ok_or_else(|| SettlementError::RecordNotFound(tx_hash.to_string()))?
            .id;
        let lock = self.record_lock(&id);
        let _guard = lock.lock().await;
        // Re-read under the lock: a concurrent update may have advanced the
        // record between the lookup and here.
        let mut record = self.fetch(&id).await?;
        if record.status.is_terminal() {
            return Ok(record);
        }
        if record.status != RecordStatus::Processing {
            return Err(SettlementError::IllegalTransition {
                from: record.status.to_string(),
                to: RecordStatus::Completed.to_string(),
            });
        }

        let effective = record.record_confirmations(confirmations);
        if effective >= self.min_confirmations {
            record.transition(RecordStatus::Completed)?;
            tracing::info!(
                record_id = %record.id,
                tx_hash,
                confirmations = effective,
                "withdrawal completed"
            );
        }
        self.records.store(record.clone()).await?;
        Ok(record)
    }

    /// Terminal path for a transaction the network no longer knows about:
    /// the record fails and the reservation comes back.
    pub async fn mark_dropped(&self, tx_hash: &str) -> Result<SettlementRecord> {
        let id = self
            .records
            .find_by_tx_hash(tx_hash)
            .await?
            .ok_or_else(|| SettlementError::RecordNotFound(tx_hash.to_string()))?
            .id;
        let lock = self.record_lock(&id);
        let _guard = lock.lock().await;
        let mut record = self.fetch(&id).await?;
        let err = SettlementError::DroppedByNetwork;
        record.mark_failed(&err)?;
        self.records.store(record.clone()).await?;
        self.ledger
            .release(&record.user_id, record.reserved_amount()?)
            .await?;
        tracing::warn!(record_id = %record.id, tx_hash, "transaction dropped by network");
        Ok(record)
    }

    async fn fetch(&self, record_id: &str) -> Result<SettlementRecord> {
        self.records
            .get(record_id)
            .await?
            .ok_or_else(|| SettlementError::RecordNotFound(record_id.to_string()))
    }

    /// Dispatch loop: select a rail, send, and on transient failure back off
    /// and try again up to `attempt_ceiling` total send attempts. Rail
    /// selection is re-evaluated every attempt.
    async fn dispatch(
        &self,
        mut record: SettlementRecord,
        attempt_ceiling: u32,
    ) -> Result<SettlementRecord> {
        let to_address = record
            .to_address
            .clone()
            .ok_or_else(|| SettlementError::Internal("withdrawal without destination".into()))?;

        loop {
            let rail = match self.selector.select(&to_address).await {
                Ok(rail) => rail,
                Err(e) => return self.fail_and_release(record, e).await,
            };
            if record.status == RecordStatus::Pending {
                record.transition(RecordStatus::Processing)?;
            }
            record.rail = rail.kind();
            record.chain.network = rail.network().to_string();
            self.records.store(record.clone()).await?;

            let outcome = rail.send(&to_address, record.net_amount).await;
            match outcome {
                Ok(dispatch) => {
                    record.record_dispatch(dispatch.tx_hash, dispatch.explorer_url);
                    self.records.store(record.clone()).await?;
                    tracing::info!(
                        record_id = %record.id,
                        tx_hash = record.chain.tx_hash.as_deref().unwrap_or_default(),
                        rail = %record.rail,
                        "dispatched; awaiting confirmations"
                    );
                    return Ok(record);
                }
                Err(RailError::Timeout(message)) => {
                    // The send may have gone through. Never re-send without
                    // asking the rail first.
                    match rail.find_dispatched(&to_address, record.net_amount).await {
                        Ok(Some(dispatch)) => {
                            tracing::warn!(
                                record_id = %record.id,
                                tx_hash = %dispatch.tx_hash,
                                "send timed out but was broadcast; adopting"
                            );
                            record.record_dispatch(dispatch.tx_hash, dispatch.explorer_url);
                            self.records.store(record.clone()).await?;
                            return Ok(record);
                        }
                        Ok(None) => {
                            // Confirmed not broadcast: safe to treat as
                            // transient and re-send.
                            let err =
                                SettlementError::RailUnavailable(format!("timeout: {message}"));
                            match self.transient_backoff(&mut record, attempt_ceiling, &err).await?
                            {
                                BackoffOutcome::RetryNow => continue,
                                BackoffOutcome::Exhausted => {
                                    return self.fail_and_release(record, err).await;
                                }
                            }
                        }
                        Err(inquiry_err) => {
                            // Inconclusive: failing safe beats paying twice.
                            let err = SettlementError::RailUnavailable(format!(
                                "timeout with inconclusive dispatch inquiry: {inquiry_err}"
                            ));
                            return self.fail_and_release(record, err).await;
                        }
                    }
                }
                Err(rail_err) => {
                    let err: SettlementError = rail_err.into();
                    if !err.is_transient() {
                        return self.fail_and_release(record, err).await;
                    }
                    match self.transient_backoff(&mut record, attempt_ceiling, &err).await? {
                        BackoffOutcome::RetryNow => continue,
                        BackoffOutcome::Exhausted => {
                            return self.fail_and_release(record, err).await;
                        }
                    }
                }
            }
        }
    }

    async fn transient_backoff(
        &self,
        record: &mut SettlementRecord,
        attempt_ceiling: u32,
        err: &SettlementError,
    ) -> Result<BackoffOutcome> {
        record.note_retry();
        self.records.store(record.clone()).await?;
        if record.retries >= attempt_ceiling {
            return Ok(BackoffOutcome::Exhausted);
        }
        let delay = self.retry.backoff_ms(record.retries);
        tracing::warn!(
            record_id = %record.id,
            retries = record.retries,
            delay_ms = delay,
            error = %err,
            "transient dispatch failure; backing off"
        );
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(BackoffOutcome::RetryNow)
    }

    async fn fail_and_release(
        &self,
        mut record: SettlementRecord,
        err: SettlementError,
    ) -> Result<SettlementRecord> {
        record.mark_failed(&err)?;
        self.records.store(record.clone()).await?;
        self.ledger
            .release(&record.user_id, record.reserved_amount()?)
            .await?;
        tracing::warn!(
            record_id = %record.id,
            error_kind = err.kind(),
            "withdrawal failed; reservation released"
        );
        Err(err)
    }
}

enum BackoffOutcome {
    RetryNow,
    Exhausted,
}
