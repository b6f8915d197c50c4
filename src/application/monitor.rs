use crate::application::engine::SettlementEngine;
use crate::config::MonitorConfig;
use crate::domain::ports::{RailError, SettlementRail};
use crate::domain::record::SettlementRecord;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Background poller that walks all `processing` records, asks each record's
/// rail for its confirmation count and feeds the result back into the engine.
///
/// Poll attempts are counted per record; a record that exceeds the configured
/// ceiling without reaching a terminal state is flagged once and skipped on
/// later passes, leaving it for an operator (or a webhook) to resolve.
pub struct ConfirmationMonitor {
    engine: Arc<SettlementEngine>,
    config: MonitorConfig,
    attempts: HashMap<String, u32>,
    stalled: HashSet<String>,
}

impl ConfirmationMonitor {
    pub fn new(engine: Arc<SettlementEngine>, config: MonitorConfig) -> Self {
        Self {
            engine,
            config,
            attempts: HashMap::new(),
            stalled: HashSet::new(),
        }
    }

    /// Polls until the shutdown channel flips to `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            poll_interval_secs = self.config.poll_interval_secs,
            "confirmation monitor started"
        );
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::error!(error = %e, "confirmation poll pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("confirmation monitor stopping");
                        return;
                    }
                }
            }
        }
    }

    /// One pass over all in-flight records. Public for tests and for a final
    /// drain on shutdown.
    pub async fn poll_once(&mut self) -> crate::error::Result<u32> {
        let records = self.engine.processing_records().await?;
        let mut updated = 0;
        for record in records {
            if self.poll_record(&record).await {
                updated += 1;
            }
        }
        let in_flight = self.engine.processing_records().await?;
        self.retain_live(&in_flight);
        Ok(updated)
    }

    async fn poll_record(&mut self, record: &SettlementRecord) -> bool {
        let Some(tx_hash) = record.chain.tx_hash.clone() else {
            // Processing without a hash means dispatch was interrupted
            // mid-write; nothing to poll for.
            tracing::warn!(record_id = %record.id, "processing record has no tx hash");
            return false;
        };
        if self.stalled.contains(&record.id) {
            return false;
        }

        let attempts = self.attempts.entry(record.id.clone()).or_insert(0);
        *attempts += 1;
        if *attempts > self.config.max_poll_attempts {
            tracing::warn!(
                record_id = %record.id,
                tx_hash,
                attempts = *attempts - 1,
                "confirmation polling ceiling reached; needs manual review"
            );
            self.stalled.insert(record.id.clone());
            return false;
        }

        let Some(rail) = self.engine.rail_for(record.rail) else {
            tracing::warn!(record_id = %record.id, rail = %record.rail, "rail not registered");
            return false;
        };

        match rail.get_confirmations(&tx_hash).await {
            Ok(confirmations) => {
                match self
                    .engine
                    .apply_confirmation_update(&tx_hash, confirmations)
                    .await
                {
                    Ok(updated) => {
                        if updated.status.is_terminal() {
                            self.forget(&record.id);
                        }
                        true
                    }
                    Err(e) => {
                        tracing::error!(record_id = %record.id, error = %e, "confirmation update failed");
                        false
                    }
                }
            }
            Err(RailError::Dropped(reason)) => {
                tracing::warn!(record_id = %record.id, tx_hash, %reason, "transaction dropped");
                if let Err(e) = self.engine.mark_dropped(&tx_hash).await {
                    tracing::error!(record_id = %record.id, error = %e, "failed to mark dropped");
                }
                self.forget(&record.id);
                true
            }
            Err(e) => {
                // Transient lookup problem; the next tick retries.
                tracing::debug!(record_id = %record.id, error = %e, "confirmation lookup failed");
                false
            }
        }
    }

    fn forget(&mut self, record_id: &str) {
        self.attempts.remove(record_id);
        self.stalled.remove(record_id);
    }

    /// Drops bookkeeping for records no longer in flight, e.g. completed via
    /// webhook between passes.
    fn retain_live(&mut self, in_flight: &[SettlementRecord]) {
        let live: HashSet<&str> = in_flight.iter().map(|r| r.id.as_str()).collect();
        self.attempts.retain(|id, _| live.contains(id.as_str()));
        self.stalled.retain(|id| live.contains(id.as_str()));
    }
}
