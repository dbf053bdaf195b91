//! Wallet ledger service
//!
//! Appends are the only mutation; the agent's cached balance is recomputed
//! from the approved signed sum and persisted in the same transaction, so a
//! committed ledger write is never observable with a stale cache.

use std::future::Future;

use sqlx::PgPool;
use uuid::Uuid;

use crate::repos::agent_repo;
use crate::repos::wallet_repo::{self, TxMetadata, WalletTxStatus, WalletTxType};

/// Errors from wallet ledger operations
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("agent not found: {0}")]
    AgentNotFound(Uuid),

    #[error("transaction amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("wallet ledger write failed: {0}")]
    LedgerWriteFailure(#[source] sqlx::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Append an approved transaction to an agent's wallet ledger and refresh
/// the balance cache atomically.
///
/// The agent row is locked for the duration, so concurrent appends for the
/// same agent serialize and each recompute sees every prior committed row.
pub async fn append_transaction(
    pool: &PgPool,
    agent_id: Uuid,
    tx_type: WalletTxType,
    amount_minor: i64,
    metadata: TxMetadata,
) -> Result<Uuid, WalletError> {
    if amount_minor <= 0 {
        return Err(WalletError::InvalidAmount(amount_minor));
    }

    let mut tx = pool.begin().await?;

    agent_repo::lock_by_id(&mut tx, agent_id)
        .await?
        .ok_or(WalletError::AgentNotFound(agent_id))?;

    let transaction_id = wallet_repo::insert(
        &mut tx,
        Uuid::new_v4(),
        agent_id,
        tx_type,
        amount_minor,
        WalletTxStatus::Approved,
        &metadata,
    )
    .await
    .map_err(WalletError::LedgerWriteFailure)?;

    let balance = wallet_repo::signed_sum_approved_tx(&mut tx, agent_id).await?;
    agent_repo::update_wallet_cache(&mut tx, agent_id, balance).await?;

    tx.commit().await?;

    tracing::info!(
        transaction_id = %transaction_id,
        agent_id = %agent_id,
        tx_type = %tx_type,
        amount_minor = amount_minor,
        wallet_balance_minor = balance,
        "Wallet transaction appended"
    );

    Ok(transaction_id)
}

/// Recompute the wallet balance from the ledger and persist it to the cache.
/// The only legitimate writer of `agents.wallet_balance_minor` besides
/// [`append_transaction`].
pub async fn recompute_wallet_balance(
    pool: &PgPool,
    agent_id: Uuid,
) -> Result<i64, WalletError> {
    let mut tx = pool.begin().await?;

    agent_repo::lock_by_id(&mut tx, agent_id)
        .await?
        .ok_or(WalletError::AgentNotFound(agent_id))?;

    let balance = wallet_repo::signed_sum_approved_tx(&mut tx, agent_id).await?;
    agent_repo::update_wallet_cache(&mut tx, agent_id, balance).await?;

    tx.commit().await?;

    Ok(balance)
}

/// Append a ledger transaction for a flow that already created a domain
/// record, compensating if the append fails.
///
/// Multi-step flows (create a domain record, then log the money movement)
/// must not leave the record orphaned with no financial trace. If the append
/// fails for any reason, the supplied compensating action runs (typically a
/// delete of the domain record) before the error surfaces. A compensation
/// that itself fails is logged and the original error still wins.
pub async fn append_with_compensation<C, Fut>(
    pool: &PgPool,
    agent_id: Uuid,
    tx_type: WalletTxType,
    amount_minor: i64,
    metadata: TxMetadata,
    compensate: C,
) -> Result<Uuid, WalletError>
where
    C: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), sqlx::Error>>,
{
    match append_transaction(pool, agent_id, tx_type, amount_minor, metadata).await {
        Ok(id) => Ok(id),
        Err(err) => {
            tracing::warn!(
                agent_id = %agent_id,
                tx_type = %tx_type,
                amount_minor = amount_minor,
                error = %err,
                "Ledger append failed, running compensating rollback"
            );

            if let Err(comp_err) = compensate().await {
                tracing::error!(
                    agent_id = %agent_id,
                    error = %comp_err,
                    "Compensating rollback failed; manual reconciliation required"
                );
            }

            Err(err)
        }
    }
}
