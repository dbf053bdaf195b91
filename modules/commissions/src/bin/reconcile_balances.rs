//! Balance reconciliation tool
//!
//! The two balance columns on the agent record are derived caches; the wallet
//! ledger and the earning-event tables are the sources of truth. This
//! admin-only tool recomputes both values for every agent (or one agent) and
//! compares them to the caches, reporting any drift. Drift is a bug to be
//! investigated, never silently papered over; `--fix` rewrites the caches
//! from the recomputed values once the cause is understood.
//!
//! # Usage
//! ```bash
//! ./reconcile_balances [--agent AGENT_UUID] [--fix]
//! ```
//!
//! Exits non-zero if drift was found and `--fix` was not given, so the tool
//! can gate a deployment pipeline.

use std::env;

use sqlx::PgPool;
use uuid::Uuid;

use commissions_rs::db::init_pool;
use commissions_rs::repos::{agent_repo, earning_repo, wallet_repo};

/// Parse command-line arguments manually (no external crate needed)
struct Args {
    agent: Option<Uuid>,
    fix: bool,
}

impl Args {
    fn parse() -> Result<Self, String> {
        let args: Vec<String> = env::args().collect();

        let mut agent = None;
        let mut fix = false;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--agent" => {
                    if i + 1 < args.len() {
                        agent = Some(
                            Uuid::parse_str(&args[i + 1])
                                .map_err(|e| format!("Invalid --agent uuid: {}", e))?,
                        );
                        i += 2;
                    } else {
                        return Err("--agent requires a value".to_string());
                    }
                }
                "--fix" => {
                    fix = true;
                    i += 1;
                }
                other => return Err(format!("Unknown argument: {}", other)),
            }
        }

        Ok(Args { agent, fix })
    }
}

struct Drift {
    agent_id: Uuid,
    cached_wallet: i64,
    derived_wallet: i64,
    cached_commission: i64,
    derived_commission: i64,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = match Args::parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Usage: reconcile_balances [--agent AGENT_UUID] [--fix]");
            std::process::exit(1);
        }
    };

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = init_pool(&database_url)
        .await
        .expect("Failed to connect to database");

    let agent_ids = match args.agent {
        Some(id) => vec![id],
        None => agent_repo::list_ids(&pool)
            .await
            .expect("Failed to list agents"),
    };

    tracing::info!("Reconciling balances for {} agent(s)", agent_ids.len());

    let mut drifts = Vec::new();

    for agent_id in agent_ids {
        match check_agent(&pool, agent_id).await {
            Ok(Some(drift)) => {
                tracing::warn!(
                    agent_id = %drift.agent_id,
                    cached_wallet = drift.cached_wallet,
                    derived_wallet = drift.derived_wallet,
                    cached_commission = drift.cached_commission,
                    derived_commission = drift.derived_commission,
                    "Balance cache drift detected"
                );
                drifts.push(drift);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(agent_id = %agent_id, "Failed to reconcile: {}", e);
                std::process::exit(1);
            }
        }
    }

    if drifts.is_empty() {
        tracing::info!("All balance caches match derived values");
        return;
    }

    if !args.fix {
        tracing::error!(
            "{} agent(s) have drifted caches; rerun with --fix to rewrite them",
            drifts.len()
        );
        std::process::exit(1);
    }

    for drift in &drifts {
        if let Err(e) = fix_agent(&pool, drift).await {
            tracing::error!(agent_id = %drift.agent_id, "Failed to fix caches: {}", e);
            std::process::exit(1);
        }
        tracing::info!(agent_id = %drift.agent_id, "Caches rewritten from derived values");
    }

    tracing::info!("Reconciliation complete, {} agent(s) fixed", drifts.len());
}

/// Recompute both balances for one agent and compare against the caches
async fn check_agent(pool: &PgPool, agent_id: Uuid) -> Result<Option<Drift>, sqlx::Error> {
    let agent = match agent_repo::find_by_id(pool, agent_id).await? {
        Some(agent) => agent,
        None => {
            tracing::warn!(agent_id = %agent_id, "Agent not found, skipping");
            return Ok(None);
        }
    };

    let derived_wallet = wallet_repo::signed_sum_approved(pool, agent_id).await?;
    let derived_commission = earning_repo::sum_eligible(pool, agent_id).await?;

    if agent.wallet_balance_minor == derived_wallet
        && agent.available_commission_minor == derived_commission
    {
        return Ok(None);
    }

    Ok(Some(Drift {
        agent_id,
        cached_wallet: agent.wallet_balance_minor,
        derived_wallet,
        cached_commission: agent.available_commission_minor,
        derived_commission,
    }))
}

/// Rewrite both caches from the derived values in one transaction
async fn fix_agent(pool: &PgPool, drift: &Drift) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    agent_repo::update_wallet_cache(&mut tx, drift.agent_id, drift.derived_wallet).await?;
    agent_repo::update_commission_cache(&mut tx, drift.agent_id, drift.derived_commission)
        .await?;

    tx.commit().await
}
