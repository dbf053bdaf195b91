use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use commissions_rs::{
    config::Config,
    db::init_pool,
    health::health,
    routes::commissions::{get_commission_summary, record_earning_event},
    routes::wallet::{append_transaction, get_wallet_balance, list_transactions},
    routes::withdrawals::{
        list_for_agent, list_pending, mark_processing, process_payout, reject_withdrawal,
        request_withdrawal,
    },
};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting commissions service...");

    // Load configuration from environment
    let config = Config::from_env()
        .expect("Failed to load configuration from environment");

    tracing::info!(
        "Configuration loaded: host={}, port={}",
        config.host,
        config.port
    );

    // Database connection
    tracing::info!("Connecting to database...");
    let pool = init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    tracing::info!("Running migrations...");
    sqlx::migrate!("./db/migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    // Build the application router
    let app = Router::new()
        .route("/api/health", get(health))
        .route("/api/commissions/events", post(record_earning_event))
        .route("/api/commissions/{agent_id}/summary", get(get_commission_summary))
        .route("/api/withdrawals", post(request_withdrawal).get(list_for_agent))
        .route("/api/withdrawals/pending", get(list_pending))
        .route("/api/withdrawals/{id}/processing", post(mark_processing))
        .route("/api/withdrawals/{id}/payout", post(process_payout))
        .route("/api/withdrawals/{id}/reject", post(reject_withdrawal))
        .route("/api/wallet/transactions", post(append_transaction))
        .route("/api/wallet/{agent_id}", get(get_wallet_balance))
        .route("/api/wallet/{agent_id}/transactions", get(list_transactions))
        .with_state(Arc::new(pool.clone()))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        );

    // Bind to the configured address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Commissions service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    // Start the server
    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
