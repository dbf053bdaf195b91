//! Withdrawal API routes
//!
//! Agent-facing request endpoint plus the operator endpoints driving the
//! settlement state machine. Idempotency-guard outcomes (`AlreadyPaid`,
//! `AlreadyRejected`) map to 200 responses so retries look like successes
//! to callers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::repos::withdrawal_repo::{self, Withdrawal};
use crate::routes::ApiError;
use crate::services::settlement_service::{
    self, PayoutOutcome, RejectOutcome, SettlementError,
};
use crate::validation;

#[derive(Debug, Deserialize)]
pub struct RequestWithdrawalBody {
    pub agent_id: Uuid,
    pub amount_minor: i64,
}

#[derive(Debug, Serialize)]
pub struct RequestWithdrawalResponse {
    pub withdrawal_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PayoutBody {
    pub admin_id: String,
    pub payout_reference: String,
}

#[derive(Debug, Serialize)]
pub struct PayoutResponse {
    pub withdrawal_id: Uuid,
    pub already_paid: bool,
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Serialize)]
pub struct RejectResponse {
    pub withdrawal_id: Uuid,
    pub already_rejected: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub agent_id: Uuid,
}

/// Withdrawal row response
#[derive(Debug, Serialize)]
pub struct WithdrawalResponse {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub amount_minor: i64,
    pub status: String,
    pub payout_reference: Option<String>,
    pub admin_notes: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<Withdrawal> for WithdrawalResponse {
    fn from(w: Withdrawal) -> Self {
        WithdrawalResponse {
            id: w.id,
            agent_id: w.agent_id,
            amount_minor: w.amount_minor,
            status: w.status.to_string(),
            payout_reference: w.payout_reference,
            admin_notes: w.admin_notes,
            requested_at: w.requested_at,
            paid_at: w.paid_at,
        }
    }
}

/// Handler for POST /api/withdrawals
pub async fn request_withdrawal(
    State(pool): State<Arc<PgPool>>,
    Json(payload): Json<RequestWithdrawalBody>,
) -> Result<(StatusCode, Json<RequestWithdrawalResponse>), ApiError> {
    validation::validate_withdrawal_amount(payload.amount_minor)?;

    let withdrawal_id =
        settlement_service::request_withdrawal(&pool, payload.agent_id, payload.amount_minor)
            .await
            .map_err(map_settlement_error)?;

    Ok((
        StatusCode::CREATED,
        Json(RequestWithdrawalResponse { withdrawal_id }),
    ))
}

/// Handler for POST /api/withdrawals/{id}/processing
pub async fn mark_processing(
    State(pool): State<Arc<PgPool>>,
    Path(withdrawal_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    settlement_service::mark_processing(&pool, withdrawal_id)
        .await
        .map_err(map_settlement_error)?;

    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /api/withdrawals/{id}/payout
pub async fn process_payout(
    State(pool): State<Arc<PgPool>>,
    Path(withdrawal_id): Path<Uuid>,
    Json(payload): Json<PayoutBody>,
) -> Result<Json<PayoutResponse>, ApiError> {
    validation::validate_payout_reference(&payload.payout_reference)?;

    let outcome = settlement_service::process_payout(
        &pool,
        withdrawal_id,
        &payload.admin_id,
        &payload.payout_reference,
    )
    .await
    .map_err(map_settlement_error)?;

    Ok(Json(PayoutResponse {
        withdrawal_id,
        already_paid: outcome == PayoutOutcome::AlreadyPaid,
    }))
}

/// Handler for POST /api/withdrawals/{id}/reject
pub async fn reject_withdrawal(
    State(pool): State<Arc<PgPool>>,
    Path(withdrawal_id): Path<Uuid>,
    Json(payload): Json<RejectBody>,
) -> Result<Json<RejectResponse>, ApiError> {
    validation::validate_admin_notes(&payload.notes)?;

    let outcome = settlement_service::reject_withdrawal(&pool, withdrawal_id, &payload.notes)
        .await
        .map_err(map_settlement_error)?;

    Ok(Json(RejectResponse {
        withdrawal_id,
        already_rejected: outcome == RejectOutcome::AlreadyRejected,
    }))
}

/// Handler for GET /api/withdrawals?agent_id=...
pub async fn list_for_agent(
    State(pool): State<Arc<PgPool>>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<WithdrawalResponse>>, ApiError> {
    let rows = withdrawal_repo::list_for_agent(&pool, params.agent_id)
        .await
        .map_err(|e| ApiError::internal(format!("database error: {}", e)))?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Handler for GET /api/withdrawals/pending
pub async fn list_pending(
    State(pool): State<Arc<PgPool>>,
) -> Result<Json<Vec<WithdrawalResponse>>, ApiError> {
    let rows = withdrawal_repo::list_pending(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("database error: {}", e)))?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

fn map_settlement_error(err: SettlementError) -> ApiError {
    match err {
        SettlementError::InvalidAmount(_) | SettlementError::InsufficientBalance { .. } => {
            ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        SettlementError::ReservationConflict => {
            ApiError::new(StatusCode::CONFLICT, err.to_string())
        }
        SettlementError::NotFound(_) => ApiError::new(StatusCode::NOT_FOUND, err.to_string()),
        SettlementError::AlreadyTerminal { .. } => {
            ApiError::new(StatusCode::CONFLICT, err.to_string())
        }
        SettlementError::Database(e) => ApiError::internal(format!("database error: {}", e)),
    }
}
