//! Commission aggregator E2E tests
//!
//! Conservation of the lifetime total, exclusion of zero-commission rows,
//! and the recording path going through the rounding policy.

mod common;

use chrono::{Duration, Utc};
use serial_test::serial;

use commissions_rs::repos::earning_repo::EarningSource;
use commissions_rs::services::commission_service;
use commissions_rs::services::settlement_service;

use common::{cleanup_test_agent, get_test_pool, seed_earning_event, setup_test_agent};

#[tokio::test]
#[serial]
async fn test_total_is_conserved_across_withdrawal_states() {
    let pool = get_test_pool().await;
    let agent_id = setup_test_agent(&pool).await;
    let base = Utc::now();

    seed_earning_event(
        &pool,
        EarningSource::Referral,
        agent_id,
        40,
        base - Duration::minutes(30),
    )
    .await;
    seed_earning_event(
        &pool,
        EarningSource::Wholesale,
        agent_id,
        60,
        base - Duration::minutes(20),
    )
    .await;

    let total_before = commission_service::get_total_commission(&pool, agent_id)
        .await
        .expect("Failed to read total");
    assert_eq!(total_before, 100);

    // Reserving and paying out must not change the lifetime total
    let withdrawal_id = settlement_service::request_withdrawal(&pool, agent_id, 40)
        .await
        .expect("Request should succeed");

    let total_reserved = commission_service::get_total_commission(&pool, agent_id)
        .await
        .expect("Failed to read total");
    assert_eq!(total_reserved, 100);

    settlement_service::process_payout(&pool, withdrawal_id, "admin-1", "MOMO-100")
        .await
        .expect("Payout should succeed");

    let total_paid = commission_service::get_total_commission(&pool, agent_id)
        .await
        .expect("Failed to read total");
    assert_eq!(total_paid, 100);

    // Available reflects only the unreserved remainder
    let available = commission_service::get_available_commission(&pool, agent_id)
        .await
        .expect("Failed to read available");
    assert_eq!(available, 60);

    cleanup_test_agent(&pool, agent_id).await;
}

#[tokio::test]
#[serial]
async fn test_zero_commission_rows_are_invisible() {
    let pool = get_test_pool().await;
    let agent_id = setup_test_agent(&pool).await;
    let base = Utc::now();

    // A completed order whose commission rounded to zero
    seed_earning_event(
        &pool,
        EarningSource::Voucher,
        agent_id,
        0,
        base - Duration::minutes(30),
    )
    .await;
    seed_earning_event(
        &pool,
        EarningSource::Voucher,
        agent_id,
        25,
        base - Duration::minutes(20),
    )
    .await;

    let total = commission_service::get_total_commission(&pool, agent_id)
        .await
        .expect("Failed to read total");
    assert_eq!(total, 25, "Zero rows never count toward the total");

    let available = commission_service::get_available_commission(&pool, agent_id)
        .await
        .expect("Failed to read available");
    assert_eq!(available, 25);

    // The zero row is never reserved either
    let withdrawal_id = settlement_service::request_withdrawal(&pool, agent_id, 25)
        .await
        .expect("Request should succeed");

    let reserved =
        commissions_rs::repos::earning_repo::find_by_withdrawal(&pool, withdrawal_id)
            .await
            .expect("Failed to fetch reserved events");
    assert_eq!(reserved.len(), 1);
    assert_eq!(reserved[0].commission_minor, 25);

    cleanup_test_agent(&pool, agent_id).await;
}

#[tokio::test]
#[serial]
async fn test_record_earning_event_applies_rounding_policy() {
    let pool = get_test_pool().await;
    let agent_id = setup_test_agent(&pool).await;

    // 0.15 at 10% rounds half-up to 0.02
    commission_service::record_earning_event(&pool, EarningSource::DataBundle, agent_id, 15, 10.0)
        .await
        .expect("Recording should succeed");

    // 0.04 at 10% is below a minor unit and records as zero
    commission_service::record_earning_event(&pool, EarningSource::DataBundle, agent_id, 4, 10.0)
        .await
        .expect("Recording a dust commission should still succeed");

    let total = commission_service::get_total_commission(&pool, agent_id)
        .await
        .expect("Failed to read total");
    assert_eq!(total, 2);

    let available = commission_service::get_available_commission(&pool, agent_id)
        .await
        .expect("Failed to read available");
    assert_eq!(available, 2);

    cleanup_test_agent(&pool, agent_id).await;
}

#[tokio::test]
#[serial]
async fn test_record_earning_event_requires_known_agent() {
    let pool = get_test_pool().await;
    let missing = uuid::Uuid::new_v4();

    let err = commission_service::record_earning_event(
        &pool,
        EarningSource::Referral,
        missing,
        1000,
        5.0,
    )
    .await
    .expect_err("Unknown agent should be refused");

    assert!(matches!(
        err,
        commission_service::CommissionError::AgentNotFound(id) if id == missing
    ));
}
