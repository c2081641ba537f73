// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! CycloFit API Server
//!
//! Accepts riding videos, delegates pose estimation to the analysis
//! service, and serves the stored results and media.

use cyclofit::{
    config::Config,
    db::MongoDb,
    services::{ArtifactService, PoseAnalysisClient, S3ObjectStore},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };
    tracing::info!(port = config.port, "Starting CycloFit API");

    // Connect to MongoDB
    let db = MongoDb::connect(&config.mongodb_uri, config.mongodb_database.as_deref()).await?;
    db.ensure_indexes().await?;
    let db = Arc::new(db);

    // Object storage
    let store = Arc::new(S3ObjectStore::new(&config).await);

    let pose_client =
        PoseAnalysisClient::new(config.pose_service_url.clone(), config.pose_service_timeout)?;
    tracing::info!(
        endpoint = %config.pose_service_url,
        timeout_secs = config.pose_service_timeout.as_secs(),
        "Pose analysis client initialized"
    );

    let artifacts = ArtifactService::new(&config, db.clone(), store);

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        pose_client,
        artifacts,
    });

    // Build router
    let app = cyclofit::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cyclofit=debug,info"));

    tracing_subscriber::registry().with(filter).with(format).init();
}
