//! Repository for the four earning-event source tables
//!
//! The sources are heterogeneous upstream (referrals, data bundles, wholesale,
//! vouchers) but expose one shared earning-event shape to the ledger. Rather
//! than a polymorphic join, every read fans out over the four tables and the
//! results are merged in memory; [`EarningSource`] is the tag.
//!
//! Reservation is a single conditional UPDATE guarded by the full eligibility
//! predicate. The `withdrawal_id` foreign key is the lock: once set, the row
//! is invisible to every other aggregation and reservation until released
//! (rejection) or finalized (payout).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Eligibility predicate shared by every scan and by the reservation UPDATE.
const ELIGIBLE: &str =
    "commission_minor > 0 AND commission_withdrawn = FALSE AND withdrawal_id IS NULL";

/// Tag identifying which source table an earning event lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarningSource {
    Referral,
    DataBundle,
    Wholesale,
    Voucher,
}

impl EarningSource {
    pub const ALL: [EarningSource; 4] = [
        EarningSource::Referral,
        EarningSource::DataBundle,
        EarningSource::Wholesale,
        EarningSource::Voucher,
    ];

    /// Backing table name. Static strings only; these are interpolated into
    /// SQL and must never come from user input.
    pub fn table(self) -> &'static str {
        match self {
            EarningSource::Referral => "referral_conversions",
            EarningSource::DataBundle => "data_bundle_orders",
            EarningSource::Wholesale => "wholesale_orders",
            EarningSource::Voucher => "voucher_orders",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EarningSource::Referral => "referral",
            EarningSource::DataBundle => "data_bundle",
            EarningSource::Wholesale => "wholesale",
            EarningSource::Voucher => "voucher",
        }
    }
}

impl std::str::FromStr for EarningSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "referral" => Ok(EarningSource::Referral),
            "data_bundle" => Ok(EarningSource::DataBundle),
            "wholesale" => Ok(EarningSource::Wholesale),
            "voucher" => Ok(EarningSource::Voucher),
            other => Err(format!("unknown earning source: {}", other)),
        }
    }
}

impl std::fmt::Display for EarningSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One commission-bearing row, tagged with its source table
#[derive(Debug, Clone)]
pub struct EarningEvent {
    pub id: Uuid,
    pub source: EarningSource,
    pub agent_id: Uuid,
    pub commission_minor: i64,
    pub commission_withdrawn: bool,
    pub withdrawal_id: Option<Uuid>,
    pub withdrawn_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

type EventRow = (
    Uuid,
    Uuid,
    i64,
    bool,
    Option<Uuid>,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
);

fn row_to_event(source: EarningSource, row: EventRow) -> EarningEvent {
    EarningEvent {
        id: row.0,
        source,
        agent_id: row.1,
        commission_minor: row.2,
        commission_withdrawn: row.3,
        withdrawal_id: row.4,
        withdrawn_at: row.5,
        created_at: row.6,
    }
}

/// Insert a completed earning event. The commission must already have passed
/// through the rounding policy; zero is allowed and permanently ineligible.
pub async fn insert_event(
    pool: &PgPool,
    source: EarningSource,
    agent_id: Uuid,
    commission_minor: i64,
) -> Result<Uuid, sqlx::Error> {
    let event_id = Uuid::new_v4();
    let sql = format!(
        r#"
        INSERT INTO {} (id, agent_id, commission_minor, status)
        VALUES ($1, $2, $3, 'completed')
        "#,
        source.table()
    );

    sqlx::query(&sql)
        .bind(event_id)
        .bind(agent_id)
        .bind(commission_minor)
        .execute(pool)
        .await?;

    Ok(event_id)
}

/// Fetch every eligible event for an agent across all four sources, merged
/// and sorted oldest-first (`created_at`, then id as a deterministic
/// tie-break). This is the FIFO order reservations consume earnings in.
pub async fn find_eligible_tx(
    tx: &mut Transaction<'_, Postgres>,
    agent_id: Uuid,
) -> Result<Vec<EarningEvent>, sqlx::Error> {
    let mut events = Vec::new();

    for source in EarningSource::ALL {
        let sql = format!(
            r#"
            SELECT id, agent_id, commission_minor, commission_withdrawn,
                   withdrawal_id, withdrawn_at, created_at
            FROM {}
            WHERE agent_id = $1 AND {}
            "#,
            source.table(),
            ELIGIBLE
        );

        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(agent_id)
            .fetch_all(&mut **tx)
            .await?;

        events.extend(rows.into_iter().map(|r| row_to_event(source, r)));
    }

    events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    Ok(events)
}

/// Sum of eligible (unreserved, unwithdrawn, positive) commissions
pub async fn sum_eligible(pool: &PgPool, agent_id: Uuid) -> Result<i64, sqlx::Error> {
    let mut total = 0i64;

    for source in EarningSource::ALL {
        let sql = format!(
            "SELECT COALESCE(SUM(commission_minor), 0)::BIGINT FROM {} WHERE agent_id = $1 AND {}",
            source.table(),
            ELIGIBLE
        );

        total += sqlx::query_scalar::<_, i64>(&sql)
            .bind(agent_id)
            .fetch_one(pool)
            .await?;
    }

    Ok(total)
}

/// Same as [`sum_eligible`] but inside a transaction, for cache refreshes
/// that must see the transaction's own writes.
pub async fn sum_eligible_tx(
    tx: &mut Transaction<'_, Postgres>,
    agent_id: Uuid,
) -> Result<i64, sqlx::Error> {
    let mut total = 0i64;

    for source in EarningSource::ALL {
        let sql = format!(
            "SELECT COALESCE(SUM(commission_minor), 0)::BIGINT FROM {} WHERE agent_id = $1 AND {}",
            source.table(),
            ELIGIBLE
        );

        total += sqlx::query_scalar::<_, i64>(&sql)
            .bind(agent_id)
            .fetch_one(&mut **tx)
            .await?;
    }

    Ok(total)
}

/// Lifetime commission total, including amounts already paid out.
/// Zero-commission rows never count.
pub async fn sum_total(pool: &PgPool, agent_id: Uuid) -> Result<i64, sqlx::Error> {
    let mut total = 0i64;

    for source in EarningSource::ALL {
        let sql = format!(
            "SELECT COALESCE(SUM(commission_minor), 0)::BIGINT FROM {} WHERE agent_id = $1 AND commission_minor > 0",
            source.table()
        );

        total += sqlx::query_scalar::<_, i64>(&sql)
            .bind(agent_id)
            .fetch_one(pool)
            .await?;
    }

    Ok(total)
}

/// Reserve specific rows of one source against a withdrawal.
///
/// The WHERE clause repeats the full eligibility predicate, so a row another
/// reservation reached first is simply not updated. Returns the number of
/// rows actually reserved; the caller compares it against the number it
/// selected and aborts the whole transaction on a shortfall.
pub async fn reserve(
    tx: &mut Transaction<'_, Postgres>,
    source: EarningSource,
    withdrawal_id: Uuid,
    agent_id: Uuid,
    event_ids: &[Uuid],
) -> Result<u64, sqlx::Error> {
    let sql = format!(
        r#"
        UPDATE {}
        SET withdrawal_id = $1
        WHERE id = ANY($2) AND agent_id = $3 AND {}
        "#,
        source.table(),
        ELIGIBLE
    );

    let result = sqlx::query(&sql)
        .bind(withdrawal_id)
        .bind(event_ids)
        .bind(agent_id)
        .execute(&mut **tx)
        .await?;

    Ok(result.rows_affected())
}

/// Permanently finalize every row reserved by a withdrawal (payout).
/// Returns the total number of rows finalized across all sources.
pub async fn finalize_for_withdrawal(
    tx: &mut Transaction<'_, Postgres>,
    withdrawal_id: Uuid,
    withdrawn_at: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let mut finalized = 0u64;

    for source in EarningSource::ALL {
        let sql = format!(
            r#"
            UPDATE {}
            SET commission_withdrawn = TRUE, withdrawn_at = $2
            WHERE withdrawal_id = $1
            "#,
            source.table()
        );

        let result = sqlx::query(&sql)
            .bind(withdrawal_id)
            .bind(withdrawn_at)
            .execute(&mut **tx)
            .await?;

        finalized += result.rows_affected();
    }

    Ok(finalized)
}

/// Release every row reserved by a withdrawal (rejection). The rows become
/// immediately eligible for a future reservation.
pub async fn release_for_withdrawal(
    tx: &mut Transaction<'_, Postgres>,
    withdrawal_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let mut released = 0u64;

    for source in EarningSource::ALL {
        let sql = format!(
            r#"
            UPDATE {}
            SET withdrawal_id = NULL, commission_withdrawn = FALSE, withdrawn_at = NULL
            WHERE withdrawal_id = $1
            "#,
            source.table()
        );

        let result = sqlx::query(&sql)
            .bind(withdrawal_id)
            .execute(&mut **tx)
            .await?;

        released += result.rows_affected();
    }

    Ok(released)
}

/// Fetch the rows currently attached to a withdrawal (audit/display)
pub async fn find_by_withdrawal(
    pool: &PgPool,
    withdrawal_id: Uuid,
) -> Result<Vec<EarningEvent>, sqlx::Error> {
    let mut events = Vec::new();

    for source in EarningSource::ALL {
        let sql = format!(
            r#"
            SELECT id, agent_id, commission_minor, commission_withdrawn,
                   withdrawal_id, withdrawn_at, created_at
            FROM {}
            WHERE withdrawal_id = $1
            "#,
            source.table()
        );

        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(withdrawal_id)
            .fetch_all(pool)
            .await?;

        events.extend(rows.into_iter().map(|r| row_to_event(source, r)));
    }

    events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_source_table_names() {
        assert_eq!(EarningSource::Referral.table(), "referral_conversions");
        assert_eq!(EarningSource::DataBundle.table(), "data_bundle_orders");
        assert_eq!(EarningSource::Wholesale.table(), "wholesale_orders");
        assert_eq!(EarningSource::Voucher.table(), "voucher_orders");
    }

    #[test]
    fn test_source_str_round_trip() {
        for source in EarningSource::ALL {
            assert_eq!(EarningSource::from_str(source.as_str()).unwrap(), source);
        }
    }

    #[test]
    fn test_unknown_source_rejected() {
        assert!(EarningSource::from_str("lottery").is_err());
    }
}
