//! Commission aggregation and earning-event recording
//!
//! The aggregator derives an agent's commission balances on demand from the
//! four earning-event tables. Both reads are pure; they never observe a row
//! mid-reservation because reservation is a single conditional UPDATE.

use sqlx::PgPool;
use uuid::Uuid;

use crate::money;
use crate::repos::agent_repo;
use crate::repos::earning_repo::{self, EarningEvent, EarningSource};

/// Errors from aggregation and event recording
#[derive(Debug, thiserror::Error)]
pub enum CommissionError {
    #[error("agent not found: {0}")]
    AgentNotFound(Uuid),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Sum of commissions still withdrawable: positive amount, not withdrawn,
/// not reserved by any in-flight withdrawal.
pub async fn get_available_commission(
    pool: &PgPool,
    agent_id: Uuid,
) -> Result<i64, CommissionError> {
    Ok(earning_repo::sum_eligible(pool, agent_id).await?)
}

/// Lifetime commission total for reporting, including paid-out amounts
pub async fn get_total_commission(pool: &PgPool, agent_id: Uuid) -> Result<i64, CommissionError> {
    Ok(earning_repo::sum_total(pool, agent_id).await?)
}

/// Record a completed earning event for an agent.
///
/// The commission is derived from the sale price and rate through the single
/// rounding policy in [`crate::money`]; a result of zero is stored as zero
/// and never becomes withdrawable.
pub async fn record_earning_event(
    pool: &PgPool,
    source: EarningSource,
    agent_id: Uuid,
    price_minor: i64,
    rate_percent: f64,
) -> Result<Uuid, CommissionError> {
    if agent_repo::find_by_id(pool, agent_id).await?.is_none() {
        return Err(CommissionError::AgentNotFound(agent_id));
    }

    let commission_minor = money::calculate_final_commission(price_minor, rate_percent);

    let event_id = earning_repo::insert_event(pool, source, agent_id, commission_minor).await?;

    tracing::info!(
        event_id = %event_id,
        agent_id = %agent_id,
        source = %source,
        price_minor = price_minor,
        rate_percent = rate_percent,
        commission_minor = commission_minor,
        "Recorded earning event"
    );

    Ok(event_id)
}

/// Greedily pick events (assumed sorted oldest-first) until their summed
/// commission covers `amount_minor`. Returns the picked events and their
/// total, or None if the pool cannot cover the amount.
///
/// The reserved total may exceed the requested amount; the withdrawal is
/// created for the reserved total so every reserved event is fully consumed.
pub fn select_events_for_amount(
    events: &[EarningEvent],
    amount_minor: i64,
) -> Option<(Vec<EarningEvent>, i64)> {
    let mut selected = Vec::new();
    let mut total = 0i64;

    for event in events {
        if total >= amount_minor {
            break;
        }
        selected.push(event.clone());
        total += event.commission_minor;
    }

    if total >= amount_minor {
        Some((selected, total))
    } else {
        None
    }
}
