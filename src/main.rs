use clap::Parser;
use dogepay::application::engine::SettlementEngine;
use dogepay::application::monitor::ConfirmationMonitor;
use dogepay::application::scheduler::LimitResetScheduler;
use dogepay::application::selector::RailSelector;
use dogepay::config::Settings;
use dogepay::domain::ports::{LedgerRef, RailRef, RecordStoreRef};
use dogepay::infrastructure::in_memory::{InMemoryLedger, InMemoryRecordStore};
use dogepay::infrastructure::rails::explorer::ExplorerRail;
use dogepay::infrastructure::rails::node::NodeRail;
use dogepay::infrastructure::rails::token::TokenRail;
use dogepay::interfaces::api::Api;
use dogepay::interfaces::commands::{Command, CommandReader};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input command stream (newline-delimited JSON)
    input: PathBuf,

    /// Configuration file (TOML). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

fn build_stores(
    db_path: Option<PathBuf>,
    settings: &Settings,
) -> Result<(LedgerRef, RecordStoreRef)> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = Arc::new(
                dogepay::infrastructure::rocksdb::RocksDbStore::open(
                    path,
                    settings.withdrawal.daily_limit,
                )
                .into_diagnostic()?,
            );
            Ok((store.clone() as LedgerRef, store as RecordStoreRef))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            tracing::warn!(
                "built without the storage-rocksdb feature; falling back to in-memory stores"
            );
            Ok((
                Arc::new(InMemoryLedger::new(settings.withdrawal.daily_limit)),
                Arc::new(InMemoryRecordStore::new()),
            ))
        }
        None => Ok((
            Arc::new(InMemoryLedger::new(settings.withdrawal.daily_limit)),
            Arc::new(InMemoryRecordStore::new()),
        )),
    }
}

async fn build_rails(settings: &Settings) -> Vec<RailRef> {
    let mut rails: Vec<RailRef> = Vec::new();
    if settings.node.enabled {
        rails.push(Arc::new(NodeRail::connect(settings.node.clone()).await));
    }
    if settings.explorer.enabled {
        rails.push(Arc::new(ExplorerRail::new(settings.explorer.clone())));
    }
    if settings.token.enabled {
        rails.push(Arc::new(TokenRail::new(settings.token.clone())));
    }
    if rails.is_empty() {
        tracing::warn!("no payment rails enabled; withdrawals will be rejected");
    }
    rails
}

async fn run_command(api: &Api, command: Command) -> serde_json::Result<String> {
    match command {
        Command::CreateWithdrawal {
            user_id,
            to_address,
            amount,
        } => serde_json::to_string(&api.create_withdrawal(&user_id, &to_address, amount).await),
        Command::GetWithdrawalStatus { record_id } => {
            serde_json::to_string(&api.get_withdrawal_status(&record_id).await)
        }
        Command::RetryWithdrawal { record_id } => {
            serde_json::to_string(&api.retry_withdrawal(&record_id).await)
        }
        Command::CancelWithdrawal { record_id } => {
            serde_json::to_string(&api.cancel_withdrawal(&record_id).await)
        }
        Command::EstimateFee { amount, rail } => {
            serde_json::to_string(&api.estimate_fee(amount, rail).await)
        }
        Command::AddEarning {
            user_id,
            amount,
            kind,
        } => serde_json::to_string(&api.add_earning(&user_id, amount, kind).await),
        Command::ListTransactions { user_id } => {
            serde_json::to_string(&api.list_transactions(&user_id).await)
        }
        Command::ConfirmationWebhook {
            tx_hash,
            confirmations,
        } => serde_json::to_string(&api.confirmation_webhook(&tx_hash, confirmations).await),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dogepay=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::load(path).into_diagnostic()?,
        None => Settings::default(),
    };

    let (ledger, records) = build_stores(cli.db_path, &settings)?;
    let rails = build_rails(&settings).await;

    let engine = Arc::new(SettlementEngine::new(
        ledger.clone(),
        records,
        RailSelector::new(rails),
        settings.withdrawal.clone(),
        settings.retry.clone(),
        settings.monitor.min_confirmations,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = ConfirmationMonitor::new(engine.clone(), settings.monitor.clone());
    let monitor_handle = tokio::spawn(monitor.run(shutdown_rx.clone()));
    let scheduler = LimitResetScheduler::new(ledger);
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    let api = Api::new(engine);
    let file = File::open(&cli.input).into_diagnostic()?;
    for command in CommandReader::new(file).commands() {
        match command {
            Ok(command) => {
                let line = run_command(&api, command).await.into_diagnostic()?;
                println!("{line}");
            }
            Err(e) => {
                eprintln!("Error reading command: {e}");
            }
        }
    }

    shutdown_tx.send(true).into_diagnostic()?;
    let _ = monitor_handle.await;
    let _ = scheduler_handle.await;

    Ok(())
}
