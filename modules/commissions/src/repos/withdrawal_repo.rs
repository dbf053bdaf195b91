use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Withdrawal status enum matching database withdrawal_status
#[derive(Debug, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "withdrawal_status", rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Requested,
    Processing,
    Paid,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WithdrawalStatus::Requested => "requested",
            WithdrawalStatus::Processing => "processing",
            WithdrawalStatus::Paid => "paid",
            WithdrawalStatus::Rejected => "rejected",
        }
    }

    /// Terminal states admit no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, WithdrawalStatus::Paid | WithdrawalStatus::Rejected)
    }
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Withdrawal model
#[derive(Debug, Clone, FromRow)]
pub struct Withdrawal {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub amount_minor: i64,
    pub status: WithdrawalStatus,
    pub payout_reference: Option<String>,
    pub processed_by: Option<String>,
    pub admin_notes: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

const SELECT_COLS: &str = "id, agent_id, amount_minor, status, payout_reference, processed_by, \
                           admin_notes, requested_at, paid_at";

/// Insert a new withdrawal in `requested` state within a transaction.
/// `amount_minor` is the sum of the events reserved alongside it.
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    withdrawal_id: Uuid,
    agent_id: Uuid,
    amount_minor: i64,
) -> Result<Uuid, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO withdrawals (id, agent_id, amount_minor, status)
        VALUES ($1, $2, $3, 'requested')
        "#,
    )
    .bind(withdrawal_id)
    .bind(agent_id)
    .bind(amount_minor)
    .execute(&mut **tx)
    .await?;

    Ok(withdrawal_id)
}

/// Find a withdrawal by id
pub async fn find_by_id(
    pool: &PgPool,
    withdrawal_id: Uuid,
) -> Result<Option<Withdrawal>, sqlx::Error> {
    sqlx::query_as::<_, Withdrawal>(&format!(
        "SELECT {} FROM withdrawals WHERE id = $1",
        SELECT_COLS
    ))
    .bind(withdrawal_id)
    .fetch_optional(pool)
    .await
}

/// Find a withdrawal by id within a transaction, taking a row lock.
///
/// The settlement engine re-reads under this lock before every transition so
/// two concurrent payouts (or a payout racing a rejection) serialize and the
/// loser observes the terminal status.
pub async fn find_by_id_for_update(
    tx: &mut Transaction<'_, Postgres>,
    withdrawal_id: Uuid,
) -> Result<Option<Withdrawal>, sqlx::Error> {
    sqlx::query_as::<_, Withdrawal>(&format!(
        "SELECT {} FROM withdrawals WHERE id = $1 FOR UPDATE",
        SELECT_COLS
    ))
    .bind(withdrawal_id)
    .fetch_optional(&mut **tx)
    .await
}

/// Transition requested -> processing. Conditional on the current status;
/// returns the number of rows updated (0 if the withdrawal was not in
/// `requested`).
pub async fn mark_processing(pool: &PgPool, withdrawal_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE withdrawals SET status = 'processing' WHERE id = $1 AND status = 'requested'",
    )
    .bind(withdrawal_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Mark a withdrawal paid within a transaction
pub async fn set_paid(
    tx: &mut Transaction<'_, Postgres>,
    withdrawal_id: Uuid,
    payout_reference: &str,
    processed_by: &str,
    paid_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE withdrawals
        SET status = 'paid', payout_reference = $2, processed_by = $3, paid_at = $4
        WHERE id = $1
        "#,
    )
    .bind(withdrawal_id)
    .bind(payout_reference)
    .bind(processed_by)
    .bind(paid_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Mark a withdrawal rejected within a transaction
pub async fn set_rejected(
    tx: &mut Transaction<'_, Postgres>,
    withdrawal_id: Uuid,
    admin_notes: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE withdrawals
        SET status = 'rejected', admin_notes = $2
        WHERE id = $1
        "#,
    )
    .bind(withdrawal_id)
    .bind(admin_notes)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// List an agent's withdrawals, newest first
pub async fn list_for_agent(
    pool: &PgPool,
    agent_id: Uuid,
) -> Result<Vec<Withdrawal>, sqlx::Error> {
    sqlx::query_as::<_, Withdrawal>(&format!(
        "SELECT {} FROM withdrawals WHERE agent_id = $1 ORDER BY requested_at DESC",
        SELECT_COLS
    ))
    .bind(agent_id)
    .fetch_all(pool)
    .await
}

/// List withdrawals awaiting an operator (requested or processing), oldest first
pub async fn list_pending(pool: &PgPool) -> Result<Vec<Withdrawal>, sqlx::Error> {
    sqlx::query_as::<_, Withdrawal>(&format!(
        "SELECT {} FROM withdrawals WHERE status IN ('requested', 'processing') ORDER BY requested_at",
        SELECT_COLS
    ))
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(WithdrawalStatus::Paid.is_terminal());
        assert!(WithdrawalStatus::Rejected.is_terminal());
        assert!(!WithdrawalStatus::Requested.is_terminal());
        assert!(!WithdrawalStatus::Processing.is_terminal());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(WithdrawalStatus::Requested.to_string(), "requested");
        assert_eq!(WithdrawalStatus::Paid.to_string(), "paid");
    }
}
