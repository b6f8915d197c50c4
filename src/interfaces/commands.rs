use crate::domain::record::{RailKind, TxKind};
use crate::error::{Result, SettlementError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::{BufRead, BufReader, Read};

/// One request from the command stream, tagged by `op`.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    CreateWithdrawal {
        user_id: String,
        to_address: String,
        amount: Decimal,
    },
    GetWithdrawalStatus {
        record_id: String,
    },
    RetryWithdrawal {
        record_id: String,
    },
    CancelWithdrawal {
        record_id: String,
    },
    EstimateFee {
        amount: Decimal,
        #[serde(default)]
        rail: Option<RailKind>,
    },
    AddEarning {
        user_id: String,
        amount: Decimal,
        kind: TxKind,
    },
    ListTransactions {
        user_id: String,
    },
    ConfirmationWebhook {
        tx_hash: String,
        confirmations: u32,
    },
}

/// Reads newline-delimited JSON commands from any `Read` source.
///
/// Lazy, line-at-a-time: large command streams never load fully into memory.
/// Blank lines are skipped; malformed lines yield an error item and the
/// stream continues.
pub struct CommandReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .lines()
            .map(|line| {
                line.map_err(|e| SettlementError::Validation(format!("cannot read command: {e}")))
            })
            .filter(|line| !matches!(line, Ok(l) if l.trim().is_empty()))
            .map(|line| {
                let line = line?;
                serde_json::from_str(&line)
                    .map_err(|e| SettlementError::Validation(format!("invalid command: {e}")))
            })
    }
}
