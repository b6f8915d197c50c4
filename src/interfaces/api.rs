use crate::application::engine::{FeeEstimate, SettlementEngine};
use crate::domain::record::{RailKind, SettlementRecord, TxKind};
use crate::error::SettlementError;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

/// Uniform response envelope for every operation: either `data` or `error`
/// is set, never both.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

/// Machine-readable error payload; `kind` is stable across releases.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub kind: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(e: SettlementError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                kind: e.kind().to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn from_result(result: crate::error::Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e),
        }
    }
}

/// The request surface over the engine. Errors never escape as `Err`; every
/// call returns an envelope the caller can serialize as-is.
pub struct Api {
    engine: Arc<SettlementEngine>,
}

impl Api {
    pub fn new(engine: Arc<SettlementEngine>) -> Self {
        Self { engine }
    }

    pub async fn create_withdrawal(
        &self,
        user_id: &str,
        to_address: &str,
        amount: Decimal,
    ) -> ApiResponse<SettlementRecord> {
        ApiResponse::from_result(self.engine.request_withdrawal(user_id, to_address, amount).await)
    }

    pub async fn get_withdrawal_status(&self, record_id: &str) -> ApiResponse<SettlementRecord> {
        ApiResponse::from_result(self.engine.get_record(record_id).await)
    }

    pub async fn retry_withdrawal(&self, record_id: &str) -> ApiResponse<SettlementRecord> {
        ApiResponse::from_result(self.engine.retry_withdrawal(record_id).await)
    }

    pub async fn cancel_withdrawal(&self, record_id: &str) -> ApiResponse<SettlementRecord> {
        ApiResponse::from_result(self.engine.cancel_withdrawal(record_id).await)
    }

    pub async fn estimate_fee(
        &self,
        amount: Decimal,
        rail: Option<RailKind>,
    ) -> ApiResponse<FeeEstimate> {
        ApiResponse::from_result(self.engine.estimate_fee(amount, rail).await)
    }

    pub async fn add_earning(
        &self,
        user_id: &str,
        amount: Decimal,
        kind: TxKind,
    ) -> ApiResponse<SettlementRecord> {
        ApiResponse::from_result(self.engine.credit(user_id, amount, kind).await)
    }

    pub async fn list_transactions(&self, user_id: &str) -> ApiResponse<Vec<SettlementRecord>> {
        ApiResponse::from_result(self.engine.records_for_user(user_id).await)
    }

    /// External confirmation push (e.g. an explorer callback). Converges on
    /// the same transition the poll loop uses, so deliveries are idempotent.
    pub async fn confirmation_webhook(
        &self,
        tx_hash: &str,
        confirmations: u32,
    ) -> ApiResponse<SettlementRecord> {
        ApiResponse::from_result(
            self.engine
                .apply_confirmation_update(tx_hash, confirmations)
                .await,
        )
    }
}
