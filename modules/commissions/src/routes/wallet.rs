//! Wallet API routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::repos::agent_repo;
use crate::repos::wallet_repo::{self, TxMetadata};
use crate::routes::ApiError;
use crate::services::wallet_service::{self, WalletError};
use crate::validation;

#[derive(Debug, Deserialize)]
pub struct AppendTransactionBody {
    pub agent_id: Uuid,
    pub tx_type: String,
    pub amount_minor: i64,
    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub reference_code: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AppendTransactionResponse {
    pub transaction_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct WalletBalanceResponse {
    pub agent_id: Uuid,
    pub wallet_balance_minor: i64,
}

#[derive(Debug, Serialize)]
pub struct WalletTransactionResponse {
    pub id: Uuid,
    pub tx_type: String,
    pub amount_minor: i64,
    pub status: String,
    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub reference_code: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Handler for POST /api/wallet/transactions
pub async fn append_transaction(
    State(pool): State<Arc<PgPool>>,
    Json(payload): Json<AppendTransactionBody>,
) -> Result<(StatusCode, Json<AppendTransactionResponse>), ApiError> {
    let tx_type = validation::validate_wallet_transaction(
        &payload.tx_type,
        payload.amount_minor,
        payload.note.as_deref(),
    )?;

    let metadata = TxMetadata {
        source_type: payload.source_type,
        source_id: payload.source_id,
        reference_code: payload.reference_code,
        note: payload.note,
    };

    let transaction_id = wallet_service::append_transaction(
        &pool,
        payload.agent_id,
        tx_type,
        payload.amount_minor,
        metadata,
    )
    .await
    .map_err(map_wallet_error)?;

    Ok((
        StatusCode::CREATED,
        Json(AppendTransactionResponse { transaction_id }),
    ))
}

/// Handler for GET /api/wallet/{agent_id}
///
/// Serves the cached balance; the cache is refreshed in the same transaction
/// as every ledger write, so this read is never older than the last commit.
pub async fn get_wallet_balance(
    State(pool): State<Arc<PgPool>>,
    Path(agent_id): Path<Uuid>,
) -> Result<Json<WalletBalanceResponse>, ApiError> {
    let agent = agent_repo::find_by_id(&pool, agent_id)
        .await
        .map_err(|e| ApiError::internal(format!("database error: {}", e)))?
        .ok_or_else(|| {
            ApiError::new(StatusCode::NOT_FOUND, format!("agent not found: {}", agent_id))
        })?;

    Ok(Json(WalletBalanceResponse {
        agent_id,
        wallet_balance_minor: agent.wallet_balance_minor,
    }))
}

/// Handler for GET /api/wallet/{agent_id}/transactions
pub async fn list_transactions(
    State(pool): State<Arc<PgPool>>,
    Path(agent_id): Path<Uuid>,
) -> Result<Json<Vec<WalletTransactionResponse>>, ApiError> {
    let rows = wallet_repo::list_for_agent(&pool, agent_id, 100)
        .await
        .map_err(|e| ApiError::internal(format!("database error: {}", e)))?;

    let response = rows
        .into_iter()
        .map(|t| WalletTransactionResponse {
            id: t.id,
            tx_type: t.tx_type.to_string(),
            amount_minor: t.amount_minor,
            status: match t.status {
                wallet_repo::WalletTxStatus::Approved => "approved".to_string(),
                wallet_repo::WalletTxStatus::Recorded => "recorded".to_string(),
            },
            source_type: t.source_type,
            source_id: t.source_id,
            reference_code: t.reference_code,
            note: t.note,
            created_at: t.created_at,
        })
        .collect();

    Ok(Json(response))
}

fn map_wallet_error(err: WalletError) -> ApiError {
    match err {
        WalletError::AgentNotFound(id) => {
            ApiError::new(StatusCode::NOT_FOUND, format!("agent not found: {}", id))
        }
        WalletError::InvalidAmount(_) => {
            ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        WalletError::LedgerWriteFailure(e) => {
            ApiError::internal(format!("ledger write failed: {}", e))
        }
        WalletError::Database(e) => ApiError::internal(format!("database error: {}", e)),
    }
}
