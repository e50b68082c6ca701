//! pgtrail - PostgreSQL database activity monitor
//!
//! Serves database activity verdicts computed from the recorded connection
//! timeline of each monitored server.

use pgtrail::config::ServerConfig;
use pgtrail::db::Store;
use pgtrail::engine::CriteriaConfig;
use pgtrail::web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("pgtrail=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting pgtrail on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let criteria = CriteriaConfig::new(store.as_ref()).load()?;
    tracing::info!(
        "Classification criteria: dead after {}d, static after {}d, low activity below {}",
        criteria.dead_days,
        criteria.static_connections_days,
        criteria.low_activity_threshold
    );

    // Start web server
    let server = Server::new(cfg, store);
    server.start().await?;

    Ok(())
}
