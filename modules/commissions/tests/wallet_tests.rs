//! Wallet ledger E2E tests
//!
//! Signed-sum convention, cache freshness, the payout asymmetry (commission
//! payouts never move the wallet balance), and the compensating rollback
//! helper.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Duration, Utc};
use serial_test::serial;
use uuid::Uuid;

use commissions_rs::repos::earning_repo::EarningSource;
use commissions_rs::repos::wallet_repo::{self, TxMetadata, WalletTxType};
use commissions_rs::services::settlement_service;
use commissions_rs::services::wallet_service::{self, WalletError};

use common::{cleanup_test_agent, get_test_pool, seed_earning_event, setup_test_agent};

async fn cached_wallet_balance(pool: &sqlx::PgPool, agent_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT wallet_balance_minor FROM agents WHERE id = $1")
        .bind(agent_id)
        .fetch_one(pool)
        .await
        .expect("Failed to read wallet cache")
}

#[tokio::test]
#[serial]
async fn test_signed_sum_and_cache_stay_in_step() {
    let pool = get_test_pool().await;
    let agent_id = setup_test_agent(&pool).await;

    wallet_service::append_transaction(
        &pool,
        agent_id,
        WalletTxType::Topup,
        1000,
        TxMetadata::default(),
    )
    .await
    .expect("Topup should succeed");

    wallet_service::append_transaction(
        &pool,
        agent_id,
        WalletTxType::Deduction,
        300,
        TxMetadata {
            source_type: Some("savings_account".to_string()),
            source_id: Some("sav-001".to_string()),
            ..Default::default()
        },
    )
    .await
    .expect("Deduction should succeed");

    // Derived and cached agree after every append
    let derived = wallet_repo::signed_sum_approved(&pool, agent_id)
        .await
        .expect("Failed to compute signed sum");
    assert_eq!(derived, 700);
    assert_eq!(cached_wallet_balance(&pool, agent_id).await, 700);

    let recomputed = wallet_service::recompute_wallet_balance(&pool, agent_id)
        .await
        .expect("Recompute should succeed");
    assert_eq!(recomputed, 700);

    cleanup_test_agent(&pool, agent_id).await;
}

#[tokio::test]
#[serial]
async fn test_refund_and_admin_types_follow_sign_convention() {
    let pool = get_test_pool().await;
    let agent_id = setup_test_agent(&pool).await;

    wallet_service::append_transaction(
        &pool,
        agent_id,
        WalletTxType::Topup,
        500,
        TxMetadata::default(),
    )
    .await
    .expect("Topup should succeed");

    wallet_service::append_transaction(
        &pool,
        agent_id,
        WalletTxType::AdminAdjustment,
        200,
        TxMetadata {
            note: Some("duplicate topup correction".to_string()),
            ..Default::default()
        },
    )
    .await
    .expect("Adjustment should succeed");

    wallet_service::append_transaction(
        &pool,
        agent_id,
        WalletTxType::Refund,
        50,
        TxMetadata::default(),
    )
    .await
    .expect("Refund should succeed");

    // 500 - 200 + 50
    assert_eq!(cached_wallet_balance(&pool, agent_id).await, 350);

    cleanup_test_agent(&pool, agent_id).await;
}

#[tokio::test]
#[serial]
async fn test_commission_payout_never_moves_wallet_balance() {
    let pool = get_test_pool().await;
    let agent_id = setup_test_agent(&pool).await;

    // Agent holds in-platform cash and separately earns commission
    wallet_service::append_transaction(
        &pool,
        agent_id,
        WalletTxType::Topup,
        1000,
        TxMetadata::default(),
    )
    .await
    .expect("Topup should succeed");

    seed_earning_event(
        &pool,
        EarningSource::Wholesale,
        agent_id,
        80,
        Utc::now() - Duration::minutes(10),
    )
    .await;

    let withdrawal_id = settlement_service::request_withdrawal(&pool, agent_id, 80)
        .await
        .expect("Request should succeed");
    settlement_service::process_payout(&pool, withdrawal_id, "admin-1", "MOMO-200")
        .await
        .expect("Payout should succeed");

    // Commission was paid externally: the wallet is untouched
    assert_eq!(cached_wallet_balance(&pool, agent_id).await, 1000);
    let derived = wallet_repo::signed_sum_approved(&pool, agent_id)
        .await
        .expect("Failed to compute signed sum");
    assert_eq!(derived, 1000);

    // But the payout left an audit trace in the ledger
    let rows = wallet_repo::list_for_agent(&pool, agent_id, 100)
        .await
        .expect("Failed to list transactions");
    let audit: Vec<_> = rows
        .iter()
        .filter(|t| t.tx_type == WalletTxType::WithdrawalDeduction)
        .collect();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].amount_minor, 80);
    assert_eq!(audit[0].source_id.as_deref(), Some(withdrawal_id.to_string().as_str()));

    cleanup_test_agent(&pool, agent_id).await;
}

#[tokio::test]
#[serial]
async fn test_append_rejects_non_positive_amounts() {
    let pool = get_test_pool().await;
    let agent_id = setup_test_agent(&pool).await;

    let err = wallet_service::append_transaction(
        &pool,
        agent_id,
        WalletTxType::Topup,
        0,
        TxMetadata::default(),
    )
    .await
    .expect_err("Zero amount should be refused");
    assert!(matches!(err, WalletError::InvalidAmount(0)));

    assert_eq!(cached_wallet_balance(&pool, agent_id).await, 0);

    cleanup_test_agent(&pool, agent_id).await;
}

#[tokio::test]
#[serial]
async fn test_compensation_runs_when_append_fails() {
    let pool = get_test_pool().await;
    let missing_agent = Uuid::new_v4();
    let compensated = AtomicBool::new(false);

    // The ledger append fails (unknown agent), so the compensating action
    // must run before the error surfaces.
    let err = wallet_service::append_with_compensation(
        &pool,
        missing_agent,
        WalletTxType::Deduction,
        500,
        TxMetadata {
            source_type: Some("savings_account".to_string()),
            source_id: Some("sav-999".to_string()),
            ..Default::default()
        },
        || async {
            compensated.store(true, Ordering::SeqCst);
            Ok(())
        },
    )
    .await
    .expect_err("Append for unknown agent should fail");

    assert!(matches!(err, WalletError::AgentNotFound(id) if id == missing_agent));
    assert!(
        compensated.load(Ordering::SeqCst),
        "Compensating rollback must run on append failure"
    );
}

#[tokio::test]
#[serial]
async fn test_compensation_skipped_on_success() {
    let pool = get_test_pool().await;
    let agent_id = setup_test_agent(&pool).await;
    let compensated = AtomicBool::new(false);

    wallet_service::append_with_compensation(
        &pool,
        agent_id,
        WalletTxType::Topup,
        250,
        TxMetadata::default(),
        || async {
            compensated.store(true, Ordering::SeqCst);
            Ok(())
        },
    )
    .await
    .expect("Append should succeed");

    assert!(
        !compensated.load(Ordering::SeqCst),
        "Compensation must not run on success"
    );
    assert_eq!(cached_wallet_balance(&pool, agent_id).await, 250);

    cleanup_test_agent(&pool, agent_id).await;
}
