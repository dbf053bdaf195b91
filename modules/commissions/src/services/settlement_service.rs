//! Withdrawal settlement state machine
//!
//! requested -> processing -> paid, or requested/processing -> rejected.
//! Every operation is one database transaction; partial progress never
//! commits. Mutual exclusion lives entirely in the database (conditional
//! UPDATEs and row locks) because the service runs as multiple instances.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::repos::earning_repo::{self, EarningSource};
use crate::repos::wallet_repo::{self, TxMetadata, WalletTxStatus, WalletTxType};
use crate::repos::withdrawal_repo::{self, WithdrawalStatus};
use crate::repos::agent_repo;
use crate::services::commission_service::select_events_for_amount;

/// How many times a reservation that lost an optimistic-concurrency race is
/// retried with a fresh eligibility scan before giving up.
const RESERVATION_RETRIES: u32 = 3;

/// Errors from the settlement state machine
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("withdrawal amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("insufficient commission balance: requested {requested_minor}, available {available_minor}")]
    InsufficientBalance {
        requested_minor: i64,
        available_minor: i64,
    },

    #[error("reservation conflict: a concurrent withdrawal reserved the same earnings")]
    ReservationConflict,

    #[error("withdrawal not found: {0}")]
    NotFound(Uuid),

    #[error("withdrawal {id} is already terminal ({status})")]
    AlreadyTerminal { id: Uuid, status: WithdrawalStatus },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Outcome of a payout call. `AlreadyPaid` is success for the caller: the
/// idempotency guard absorbed a duplicate click or a retried request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutOutcome {
    Paid,
    AlreadyPaid,
}

/// Outcome of a rejection call; `AlreadyRejected` makes retries safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectOutcome {
    Rejected,
    AlreadyRejected,
}

/// Create a withdrawal and reserve earning events to cover it.
///
/// Preconditions: amount > 0 and amount <= the agent's available commission
/// at scan time. Events are consumed oldest-first. If a concurrent request
/// wins the race on some selected rows, the transaction aborts and the whole
/// scan-select-reserve cycle reruns, up to [`RESERVATION_RETRIES`] times.
pub async fn request_withdrawal(
    pool: &PgPool,
    agent_id: Uuid,
    amount_minor: i64,
) -> Result<Uuid, SettlementError> {
    if amount_minor <= 0 {
        return Err(SettlementError::InvalidAmount(amount_minor));
    }

    let mut attempt = 0;
    loop {
        attempt += 1;
        match try_reserve(pool, agent_id, amount_minor).await {
            Err(SettlementError::ReservationConflict) if attempt < RESERVATION_RETRIES => {
                tracing::warn!(
                    agent_id = %agent_id,
                    amount_minor = amount_minor,
                    attempt = attempt,
                    "Reservation lost a concurrent race, rescanning"
                );
            }
            other => return other,
        }
    }
}

/// One scan-select-reserve cycle in a single transaction
async fn try_reserve(
    pool: &PgPool,
    agent_id: Uuid,
    amount_minor: i64,
) -> Result<Uuid, SettlementError> {
    let mut tx = pool.begin().await?;

    let eligible = earning_repo::find_eligible_tx(&mut tx, agent_id).await?;
    let available: i64 = eligible.iter().map(|e| e.commission_minor).sum();

    if amount_minor > available {
        return Err(SettlementError::InsufficientBalance {
            requested_minor: amount_minor,
            available_minor: available,
        });
    }

    // Cannot fail after the availability check above
    let Some((selected, reserved_total)) = select_events_for_amount(&eligible, amount_minor)
    else {
        return Err(SettlementError::InsufficientBalance {
            requested_minor: amount_minor,
            available_minor: available,
        });
    };

    let withdrawal_id = Uuid::new_v4();
    withdrawal_repo::insert(&mut tx, withdrawal_id, agent_id, reserved_total).await?;

    // Per-source conditional UPDATE. Rows that stopped matching the
    // eligibility predicate since the scan are silently skipped, which the
    // count check below turns into a conflict.
    let mut reserved_rows = 0u64;
    for source in EarningSource::ALL {
        let ids: Vec<Uuid> = selected
            .iter()
            .filter(|e| e.source == source)
            .map(|e| e.id)
            .collect();

        if ids.is_empty() {
            continue;
        }

        reserved_rows +=
            earning_repo::reserve(&mut tx, source, withdrawal_id, agent_id, &ids).await?;
    }

    if reserved_rows as usize != selected.len() {
        // Dropping the transaction rolls everything back, including the
        // withdrawal row and any partial reservations.
        return Err(SettlementError::ReservationConflict);
    }

    let remaining = earning_repo::sum_eligible_tx(&mut tx, agent_id).await?;
    agent_repo::update_commission_cache(&mut tx, agent_id, remaining).await?;

    tx.commit().await?;

    tracing::info!(
        withdrawal_id = %withdrawal_id,
        agent_id = %agent_id,
        requested_minor = amount_minor,
        reserved_minor = reserved_total,
        reserved_events = selected.len(),
        "Withdrawal requested and earnings reserved"
    );

    Ok(withdrawal_id)
}

/// Transition requested -> processing (operator picked the request up).
/// Calling it again while already processing is a no-op success.
pub async fn mark_processing(pool: &PgPool, withdrawal_id: Uuid) -> Result<(), SettlementError> {
    let updated = withdrawal_repo::mark_processing(pool, withdrawal_id).await?;
    if updated == 1 {
        return Ok(());
    }

    // The conditional update matched nothing; find out why.
    let withdrawal = withdrawal_repo::find_by_id(pool, withdrawal_id)
        .await?
        .ok_or(SettlementError::NotFound(withdrawal_id))?;

    match withdrawal.status {
        WithdrawalStatus::Processing => Ok(()),
        status => Err(SettlementError::AlreadyTerminal {
            id: withdrawal_id,
            status,
        }),
    }
}

/// Settle a withdrawal: mark it paid and finalize its reserved earnings.
///
/// Idempotent: a withdrawal already `paid` returns
/// [`PayoutOutcome::AlreadyPaid`] without touching anything, so duplicate
/// admin clicks and post-timeout retries cannot pay twice. The wallet balance
/// is deliberately not decremented; commission payouts settle externally and
/// the `withdrawal_deduction` row is an audit trace only.
pub async fn process_payout(
    pool: &PgPool,
    withdrawal_id: Uuid,
    admin_id: &str,
    payout_reference: &str,
) -> Result<PayoutOutcome, SettlementError> {
    let mut tx = pool.begin().await?;

    let withdrawal = withdrawal_repo::find_by_id_for_update(&mut tx, withdrawal_id)
        .await?
        .ok_or(SettlementError::NotFound(withdrawal_id))?;

    match withdrawal.status {
        WithdrawalStatus::Paid => {
            tracing::info!(
                withdrawal_id = %withdrawal_id,
                admin_id = %admin_id,
                "Withdrawal already paid, payout skipped"
            );
            return Ok(PayoutOutcome::AlreadyPaid);
        }
        WithdrawalStatus::Rejected => {
            return Err(SettlementError::AlreadyTerminal {
                id: withdrawal_id,
                status: WithdrawalStatus::Rejected,
            });
        }
        WithdrawalStatus::Requested | WithdrawalStatus::Processing => {}
    }

    let paid_at = Utc::now();

    withdrawal_repo::set_paid(&mut tx, withdrawal_id, payout_reference, admin_id, paid_at)
        .await?;

    let finalized =
        earning_repo::finalize_for_withdrawal(&mut tx, withdrawal_id, paid_at).await?;

    if finalized == 0 {
        tracing::warn!(
            withdrawal_id = %withdrawal_id,
            "Paid withdrawal had no reserved earning events"
        );
    }

    wallet_repo::insert(
        &mut tx,
        Uuid::new_v4(),
        withdrawal.agent_id,
        WalletTxType::WithdrawalDeduction,
        withdrawal.amount_minor,
        WalletTxStatus::Recorded,
        &TxMetadata {
            source_type: Some("withdrawal".to_string()),
            source_id: Some(withdrawal_id.to_string()),
            reference_code: Some(payout_reference.to_string()),
            note: None,
        },
    )
    .await?;

    let remaining = earning_repo::sum_eligible_tx(&mut tx, withdrawal.agent_id).await?;
    agent_repo::update_commission_cache(&mut tx, withdrawal.agent_id, remaining).await?;

    tx.commit().await?;

    tracing::info!(
        withdrawal_id = %withdrawal_id,
        agent_id = %withdrawal.agent_id,
        amount_minor = withdrawal.amount_minor,
        admin_id = %admin_id,
        payout_reference = %payout_reference,
        finalized_events = finalized,
        "Withdrawal paid"
    );

    Ok(PayoutOutcome::Paid)
}

/// Reject a withdrawal, releasing its reservation in full.
///
/// Every previously reserved event becomes immediately eligible again. No
/// wallet row is written; nothing was ever paid. Rejecting an already
/// rejected withdrawal is a retry-safe no-op; rejecting a paid one refuses.
pub async fn reject_withdrawal(
    pool: &PgPool,
    withdrawal_id: Uuid,
    admin_notes: &str,
) -> Result<RejectOutcome, SettlementError> {
    let mut tx = pool.begin().await?;

    let withdrawal = withdrawal_repo::find_by_id_for_update(&mut tx, withdrawal_id)
        .await?
        .ok_or(SettlementError::NotFound(withdrawal_id))?;

    match withdrawal.status {
        WithdrawalStatus::Rejected => {
            tracing::info!(
                withdrawal_id = %withdrawal_id,
                "Withdrawal already rejected, skipping"
            );
            return Ok(RejectOutcome::AlreadyRejected);
        }
        WithdrawalStatus::Paid => {
            return Err(SettlementError::AlreadyTerminal {
                id: withdrawal_id,
                status: WithdrawalStatus::Paid,
            });
        }
        WithdrawalStatus::Requested | WithdrawalStatus::Processing => {}
    }

    withdrawal_repo::set_rejected(&mut tx, withdrawal_id, admin_notes).await?;

    let released = earning_repo::release_for_withdrawal(&mut tx, withdrawal_id).await?;

    let available = earning_repo::sum_eligible_tx(&mut tx, withdrawal.agent_id).await?;
    agent_repo::update_commission_cache(&mut tx, withdrawal.agent_id, available).await?;

    tx.commit().await?;

    tracing::info!(
        withdrawal_id = %withdrawal_id,
        agent_id = %withdrawal.agent_id,
        released_events = released,
        "Withdrawal rejected, reservation released"
    );

    Ok(RejectOutcome::Rejected)
}
