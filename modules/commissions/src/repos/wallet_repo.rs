//! Repository for the append-only wallet ledger
//!
//! Rows are never updated or deleted; compensating entries correct mistakes.
//! Amounts are positive magnitudes and the transaction type carries the sign,
//! so the spendable balance is the signed sum of the `approved` rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Wallet transaction type enum matching database wallet_tx_type
#[derive(Debug, Clone, Copy, sqlx::Type, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "wallet_tx_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WalletTxType {
    Topup,
    Deduction,
    Refund,
    Commission,
    WithdrawalDeduction,
    AdminReversal,
    AdminAdjustment,
}

impl WalletTxType {
    /// Whether this type credits (+) or debits (-) the wallet
    pub fn is_credit(self) -> bool {
        matches!(
            self,
            WalletTxType::Topup
                | WalletTxType::Refund
                | WalletTxType::Commission
                | WalletTxType::AdminReversal
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WalletTxType::Topup => "topup",
            WalletTxType::Deduction => "deduction",
            WalletTxType::Refund => "refund",
            WalletTxType::Commission => "commission",
            WalletTxType::WithdrawalDeduction => "withdrawal_deduction",
            WalletTxType::AdminReversal => "admin_reversal",
            WalletTxType::AdminAdjustment => "admin_adjustment",
        }
    }
}

impl std::str::FromStr for WalletTxType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "topup" => Ok(WalletTxType::Topup),
            "deduction" => Ok(WalletTxType::Deduction),
            "refund" => Ok(WalletTxType::Refund),
            "commission" => Ok(WalletTxType::Commission),
            "withdrawal_deduction" => Ok(WalletTxType::WithdrawalDeduction),
            "admin_reversal" => Ok(WalletTxType::AdminReversal),
            "admin_adjustment" => Ok(WalletTxType::AdminAdjustment),
            other => Err(format!("unknown wallet transaction type: {}", other)),
        }
    }
}

impl std::fmt::Display for WalletTxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wallet transaction status enum matching database wallet_tx_status
///
/// `Approved` rows enter the signed balance sum. `Recorded` rows are
/// audit-only traces of money that moved outside the wallet (commission
/// payouts settle externally).
#[derive(Debug, Clone, Copy, sqlx::Type, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "wallet_tx_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WalletTxStatus {
    Approved,
    Recorded,
}

/// Wallet transaction model (read shape)
#[derive(Debug, Clone, FromRow)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub tx_type: WalletTxType,
    pub amount_minor: i64,
    pub status: WalletTxStatus,
    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub reference_code: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Traceability metadata attached to a ledger entry
#[derive(Debug, Clone, Default)]
pub struct TxMetadata {
    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub reference_code: Option<String>,
    pub note: Option<String>,
}

/// Append one ledger row within a transaction. Pure insert; the caller is
/// responsible for refreshing the balance cache in the same transaction.
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    transaction_id: Uuid,
    agent_id: Uuid,
    tx_type: WalletTxType,
    amount_minor: i64,
    status: WalletTxStatus,
    metadata: &TxMetadata,
) -> Result<Uuid, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO wallet_transactions
            (id, agent_id, tx_type, amount_minor, status, source_type, source_id, reference_code, note)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(transaction_id)
    .bind(agent_id)
    .bind(tx_type)
    .bind(amount_minor)
    .bind(status)
    .bind(&metadata.source_type)
    .bind(&metadata.source_id)
    .bind(&metadata.reference_code)
    .bind(&metadata.note)
    .execute(&mut **tx)
    .await?;

    Ok(transaction_id)
}

const SIGNED_SUM: &str = r#"
    SELECT COALESCE(SUM(
        CASE WHEN tx_type IN ('topup', 'refund', 'commission', 'admin_reversal')
             THEN amount_minor
             ELSE -amount_minor
        END
    ), 0)::BIGINT
    FROM wallet_transactions
    WHERE agent_id = $1 AND status = 'approved'
"#;

/// Signed sum of the approved ledger rows for an agent
pub async fn signed_sum_approved(pool: &PgPool, agent_id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(SIGNED_SUM)
        .bind(agent_id)
        .fetch_one(pool)
        .await
}

/// Signed sum within a transaction, for cache refreshes that must see the
/// transaction's own append.
pub async fn signed_sum_approved_tx(
    tx: &mut Transaction<'_, Postgres>,
    agent_id: Uuid,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(SIGNED_SUM)
        .bind(agent_id)
        .fetch_one(&mut **tx)
        .await
}

/// List an agent's ledger rows, newest first
pub async fn list_for_agent(
    pool: &PgPool,
    agent_id: Uuid,
    limit: i64,
) -> Result<Vec<WalletTransaction>, sqlx::Error> {
    sqlx::query_as::<_, WalletTransaction>(
        r#"
        SELECT id, agent_id, tx_type, amount_minor, status,
               source_type, source_id, reference_code, note, created_at
        FROM wallet_transactions
        WHERE agent_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2
        "#,
    )
    .bind(agent_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Count rows written for a given source (idempotency checks in tests/audit)
pub async fn count_for_source(
    pool: &PgPool,
    source_type: &str,
    source_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM wallet_transactions WHERE source_type = $1 AND source_id = $2",
    )
    .bind(source_type)
    .bind(source_id)
    .fetch_one(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_sign_convention() {
        assert!(WalletTxType::Topup.is_credit());
        assert!(WalletTxType::Refund.is_credit());
        assert!(WalletTxType::Commission.is_credit());
        assert!(WalletTxType::AdminReversal.is_credit());
        assert!(!WalletTxType::Deduction.is_credit());
        assert!(!WalletTxType::WithdrawalDeduction.is_credit());
        assert!(!WalletTxType::AdminAdjustment.is_credit());
    }

    #[test]
    fn test_tx_type_str_round_trip() {
        let all = [
            WalletTxType::Topup,
            WalletTxType::Deduction,
            WalletTxType::Refund,
            WalletTxType::Commission,
            WalletTxType::WithdrawalDeduction,
            WalletTxType::AdminReversal,
            WalletTxType::AdminAdjustment,
        ];
        for tx_type in all {
            assert_eq!(WalletTxType::from_str(tx_type.as_str()).unwrap(), tx_type);
        }
    }
}
