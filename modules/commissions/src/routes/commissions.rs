//! Commission API routes
//!
//! Read endpoints for dashboards plus the recording endpoint event sources
//! call when one of their domain operations completes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::routes::ApiError;
use crate::services::commission_service::{self, CommissionError};
use crate::validation;

/// Commission balances for an agent
#[derive(Debug, Serialize)]
pub struct CommissionSummaryResponse {
    pub agent_id: Uuid,
    pub total_commission_minor: i64,
    pub available_commission_minor: i64,
}

/// Request body for recording a completed earning event
#[derive(Debug, Deserialize)]
pub struct RecordEarningEventRequest {
    pub source: String,
    pub agent_id: Uuid,
    pub price_minor: i64,
    pub rate_percent: f64,
}

#[derive(Debug, Serialize)]
pub struct RecordEarningEventResponse {
    pub event_id: Uuid,
}

/// Handler for GET /api/commissions/{agent_id}/summary
pub async fn get_commission_summary(
    State(pool): State<Arc<PgPool>>,
    Path(agent_id): Path<Uuid>,
) -> Result<Json<CommissionSummaryResponse>, ApiError> {
    let total = commission_service::get_total_commission(&pool, agent_id)
        .await
        .map_err(map_commission_error)?;

    let available = commission_service::get_available_commission(&pool, agent_id)
        .await
        .map_err(map_commission_error)?;

    Ok(Json(CommissionSummaryResponse {
        agent_id,
        total_commission_minor: total,
        available_commission_minor: available,
    }))
}

/// Handler for POST /api/commissions/events
pub async fn record_earning_event(
    State(pool): State<Arc<PgPool>>,
    Json(payload): Json<RecordEarningEventRequest>,
) -> Result<(StatusCode, Json<RecordEarningEventResponse>), ApiError> {
    let source = validation::validate_earning_event(
        &payload.source,
        payload.price_minor,
        payload.rate_percent,
    )?;

    let event_id = commission_service::record_earning_event(
        &pool,
        source,
        payload.agent_id,
        payload.price_minor,
        payload.rate_percent,
    )
    .await
    .map_err(map_commission_error)?;

    Ok((
        StatusCode::CREATED,
        Json(RecordEarningEventResponse { event_id }),
    ))
}

fn map_commission_error(err: CommissionError) -> ApiError {
    match err {
        CommissionError::AgentNotFound(id) => {
            ApiError::new(StatusCode::NOT_FOUND, format!("agent not found: {}", id))
        }
        CommissionError::Database(e) => ApiError::internal(format!("database error: {}", e)),
    }
}
