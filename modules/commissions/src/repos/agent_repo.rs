use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Agent model: a reseller identity plus the two derived balance caches.
///
/// `wallet_balance_minor` and `available_commission_minor` are memoized views
/// over the wallet ledger and the earning-event tables. They are written only
/// by the engine's recompute paths, never by callers directly.
#[derive(Debug, Clone, FromRow)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub wallet_balance_minor: i64,
    pub available_commission_minor: i64,
    pub created_at: DateTime<Utc>,
}

/// Insert a new agent with zeroed balance caches
pub async fn insert(
    pool: &PgPool,
    agent_id: Uuid,
    name: &str,
    phone: Option<&str>,
) -> Result<Uuid, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO agents (id, name, phone, wallet_balance_minor, available_commission_minor)
        VALUES ($1, $2, $3, 0, 0)
        "#,
    )
    .bind(agent_id)
    .bind(name)
    .bind(phone)
    .execute(pool)
    .await?;

    Ok(agent_id)
}

/// Find an agent by id
pub async fn find_by_id(pool: &PgPool, agent_id: Uuid) -> Result<Option<Agent>, sqlx::Error> {
    sqlx::query_as::<_, Agent>(
        r#"
        SELECT id, name, phone, wallet_balance_minor, available_commission_minor, created_at
        FROM agents
        WHERE id = $1
        "#,
    )
    .bind(agent_id)
    .fetch_optional(pool)
    .await
}

/// Find an agent by id within a transaction, taking a row lock.
///
/// Serializes concurrent cache recomputes for the same agent: the lock holder
/// recomputes from committed ledger state and writes the cache before anyone
/// else can.
pub async fn lock_by_id(
    tx: &mut Transaction<'_, Postgres>,
    agent_id: Uuid,
) -> Result<Option<Agent>, sqlx::Error> {
    sqlx::query_as::<_, Agent>(
        r#"
        SELECT id, name, phone, wallet_balance_minor, available_commission_minor, created_at
        FROM agents
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(agent_id)
    .fetch_optional(&mut **tx)
    .await
}

/// Overwrite the wallet balance cache within a transaction
pub async fn update_wallet_cache(
    tx: &mut Transaction<'_, Postgres>,
    agent_id: Uuid,
    balance_minor: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE agents SET wallet_balance_minor = $2 WHERE id = $1")
        .bind(agent_id)
        .bind(balance_minor)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// Overwrite the available-commission cache within a transaction
pub async fn update_commission_cache(
    tx: &mut Transaction<'_, Postgres>,
    agent_id: Uuid,
    available_minor: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE agents SET available_commission_minor = $2 WHERE id = $1")
        .bind(agent_id)
        .bind(available_minor)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// List all agent ids (reconciliation tooling)
pub async fn list_ids(pool: &PgPool) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM agents ORDER BY created_at")
        .fetch_all(pool)
        .await
}
