use anyhow::Context;
use axum::{response::Json, routing::get, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{info, warn};

mod api;
mod config;
mod db;
mod error;
mod jobs;
mod stock;
mod transcription;

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(config::Config::from_env()?);

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    std::fs::create_dir_all(&config.upload_dir)
        .with_context(|| format!("Failed to create {:?}", config.upload_dir))?;

    // Initialize database
    let db = Arc::new(db::Database::new(&config.db_path)?);
    info!("Database initialized at {:?}", config.db_path);

    // Fail runs left running by a previous process
    let runs = Arc::new(jobs::RunManager::new(db.clone()));
    let recovered = runs.recover_interrupted_runs()?;
    if recovered > 0 {
        warn!(recovered, "marked interrupted pipeline runs as failed");
    }

    // Initialize providers
    let resolver = Arc::new(stock::StockMediaResolver::from_config(&config)?);
    let transcriber = transcription::from_config(&config)?;
    info!(
        stock_media = resolver.provider_name(),
        transcriber = transcriber.name(),
        "providers configured"
    );

    let state = api::AppState {
        db,
        runs,
        resolver,
        transcriber,
        config: config.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_credentials(false);

    // Build the router with CORS support
    let app = Router::new()
        .route("/health", get(health))
        .nest("/api", api::router(state))
        .nest_service("/uploads", ServeDir::new(&config.upload_dir))
        .layer(cors);

    info!("Starting daemon server on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
