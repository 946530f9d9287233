// src/server/main.rs
// Entry point for the quickteams server
use log::{error, info};
use quickteams::server::{config::ServerConfig, connection::Server, database::Database};
use quickteams::utils::performance;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    // Configure logging from the loaded config
    std::env::set_var("RUST_LOG", &config.log_level);
    env_logger::init();

    if config.enable_encryption {
        info!("TLS is enabled; set TLS_CERT_PATH and TLS_KEY_PATH env vars to point to cert and key PEM files.");
    } else {
        info!("TLS is disabled; connections will be plain TCP.");
    }

    let database = Arc::new(Database::connect(&config.database_url).await?);

    info!("Running database migrations...");
    database.migrate().await.map_err(|e| {
        error!("Database migration failed: {}", e);
        e
    })?;
    info!("Database migrations completed");

    // Start performance logger in background
    let perf_log_path = std::env::var("PERFORMANCE_LOG_PATH")
        .unwrap_or_else(|_| "data/quickteams_performance.log".to_string());
    let perf_db = database.clone();
    tokio::spawn(async move {
        info!("Starting performance logger - logging every 120 seconds to: {}", perf_log_path);
        performance::start_performance_logger(perf_db, &perf_log_path).await;
    });

    // Expired sessions are swept hourly.
    let cleanup_db = database.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            quickteams::server::auth::cleanup_expired_sessions(cleanup_db.clone()).await;
        }
    });

    let server = Server { db: database, config: config.clone() };
    server.run(&format!("{}:{}", config.host, config.port)).await?;
    Ok(())
}
