mod common;

use common::{available, settlement_context, NATIVE_ADDR};
use dogepay::domain::ports::RailError;
use dogepay::domain::record::{RecordStatus, TxKind};
use dogepay::error::SettlementError;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_withdrawal_lifecycle_to_completion() {
    let ctx = settlement_context();

    let record = ctx
        .engine
        .request_withdrawal("u1", NATIVE_ADDR, dec!(40))
        .await
        .unwrap();
    assert_eq!(record.status, RecordStatus::Processing);
    assert_eq!(record.net_amount, dec!(39));
    assert_eq!(available(&ctx, "u1").await, dec!(60));

    // Confirmations arrive over several updates; threshold completes it.
    let tx_hash = record.chain.tx_hash.unwrap();
    for confs in [1, 4, 6] {
        ctx.engine
            .apply_confirmation_update(&tx_hash, confs)
            .await
            .unwrap();
    }
    let done = ctx.engine.get_record(&record.id).await.unwrap();
    assert_eq!(done.status, RecordStatus::Completed);
    assert_eq!(done.chain.confirmations, 6);
    // Reservation is consumed, not released.
    assert_eq!(available(&ctx, "u1").await, dec!(60));
}

#[tokio::test]
async fn test_transient_failures_retry_then_succeed() {
    let ctx = settlement_context();
    ctx.rail
        .queue_send_failure(RailError::Unavailable("down".into()));
    ctx.rail
        .queue_send_failure(RailError::Unavailable("still down".into()));

    let record = ctx
        .engine
        .request_withdrawal("u1", NATIVE_ADDR, dec!(40))
        .await
        .unwrap();
    assert_eq!(record.status, RecordStatus::Processing);
    assert_eq!(record.retries, 2);
    assert_eq!(ctx.rail.send_calls(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_fail_and_release() {
    let ctx = settlement_context();
    for _ in 0..3 {
        ctx.rail
            .queue_send_failure(RailError::Unavailable("down".into()));
    }

    let err = ctx
        .engine
        .request_withdrawal("u1", NATIVE_ADDR, dec!(40))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::RailUnavailable(_)));
    assert_eq!(available(&ctx, "u1").await, dec!(100));

    // The failed record survives for audit and can be retried.
    let failed = ctx.engine.records_for_user("u1").await.unwrap().remove(0);
    assert_eq!(failed.status, RecordStatus::Failed);

    let retried = ctx.engine.retry_withdrawal(&failed.id).await.unwrap();
    assert_eq!(retried.status, RecordStatus::Processing);
    assert_eq!(available(&ctx, "u1").await, dec!(60));
}

#[tokio::test]
async fn test_no_available_rail_rejects_upfront() {
    let ctx = settlement_context();
    ctx.rail.set_available(false);

    let err = ctx
        .engine
        .request_withdrawal("u1", NATIVE_ADDR, dec!(40))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::NoRailAvailable));
    assert_eq!(available(&ctx, "u1").await, dec!(100));
    assert!(ctx.engine.records_for_user("u1").await.unwrap().is_empty());
    assert_eq!(ctx.rail.send_calls(), 0);
}

#[tokio::test]
async fn test_daily_limit_spans_multiple_withdrawals() {
    let ctx = settlement_context();
    ctx.engine.credit("u1", dec!(100000), TxKind::Earning).await.unwrap();

    // Default daily limit is 50000; five 9999 withdrawals fit, the next
    // request would cross the line.
    for _ in 0..5 {
        ctx.engine
            .request_withdrawal("u1", NATIVE_ADDR, dec!(9999))
            .await
            .unwrap();
    }
    let err = ctx
        .engine
        .request_withdrawal("u1", NATIVE_ADDR, dec!(10))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::DailyLimitExceeded));
}

#[tokio::test]
async fn test_earnings_flow_into_withdrawable_balance() {
    let ctx = settlement_context();
    ctx.engine.credit("u2", dec!(30), TxKind::Earning).await.unwrap();
    ctx.engine.credit("u2", dec!(20), TxKind::Referral).await.unwrap();
    assert_eq!(available(&ctx, "u2").await, dec!(50));

    let record = ctx
        .engine
        .request_withdrawal("u2", NATIVE_ADDR, dec!(50))
        .await
        .unwrap();
    assert_eq!(record.status, RecordStatus::Processing);
    assert_eq!(available(&ctx, "u2").await, dec!(0));

    let records = ctx.engine.records_for_user("u2").await.unwrap();
    assert_eq!(records.len(), 3);
}

#[tokio::test]
async fn test_randomized_credits_sum_exactly() {
    use rand::Rng;

    let ctx = settlement_context();
    let mut rng = rand::thread_rng();
    let mut expected = dec!(0);
    for _ in 0..50 {
        // Two decimal places so the expected sum is exact.
        let cents: i64 = rng.gen_range(1..=100_000);
        let amount = rust_decimal::Decimal::new(cents, 2);
        expected += amount;
        ctx.engine.credit("u3", amount, TxKind::Earning).await.unwrap();
    }
    assert_eq!(available(&ctx, "u3").await, expected);
    assert_eq!(ctx.engine.records_for_user("u3").await.unwrap().len(), 50);
}

#[tokio::test]
async fn test_insufficient_funds_leaves_no_trace() {
    let ctx = settlement_context();
    let err = ctx
        .engine
        .request_withdrawal("u1", NATIVE_ADDR, dec!(500))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::InsufficientFunds));
    assert_eq!(available(&ctx, "u1").await, dec!(100));
    assert_eq!(ctx.rail.send_calls(), 0);
}
