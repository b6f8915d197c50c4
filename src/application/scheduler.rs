use crate::domain::ports::{Ledger, LedgerRef};
use chrono::{NaiveDate, Utc};
use std::time::Duration;
use tokio::sync::watch;

/// Rolls daily withdrawal counters over at midnight UTC.
///
/// The ledger already resets counters lazily on first touch each day; this
/// sweep is the consistency pass that also resets accounts nobody touched,
/// so reads (balances, limit headroom) are correct without a write.
pub struct LimitResetScheduler {
    ledger: LedgerRef,
    check_interval: Duration,
    last_swept: NaiveDate,
}

impl LimitResetScheduler {
    pub fn new(ledger: LedgerRef) -> Self {
        Self {
            ledger,
            check_interval: Duration::from_secs(60),
            last_swept: Utc::now().date_naive(),
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!("limit reset scheduler started");
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("limit reset scheduler stopping");
                        return;
                    }
                }
            }
        }
    }

    async fn tick(&mut self) {
        let today = Utc::now().date_naive();
        if today == self.last_swept {
            return;
        }
        match self.ledger.sweep_daily_limits(today).await {
            Ok(reset) => {
                tracing::info!(%today, accounts_reset = reset, "daily limits swept");
                self.last_swept = today;
            }
            Err(e) => {
                // last_swept stays put so the next tick retries.
                tracing::error!(error = %e, "daily limit sweep failed");
            }
        }
    }
}
