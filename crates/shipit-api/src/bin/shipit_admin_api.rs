// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ship It admin API server.

use std::sync::Arc;
use tracing::{info, warn};

use shipit_api::config::Config;
use shipit_api::github::GraphQlClient;
use shipit_api::migrations;
use shipit_api::server::{admin_router, serve};
use shipit_api::state::AppState;
use shipit_api::taskcluster::TaskclusterClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shipit_api=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;
    info!(
        bind_addr = %config.bind_addr,
        app_channel = %config.app_channel,
        taskcluster_root_url = %config.taskcluster.root_url,
        "Starting Ship It admin API"
    );

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    info!("Connected to database");

    migrations::run(&pool).await?;
    info!("Database migrations applied");

    let taskcluster = Arc::new(TaskclusterClient::new(&config.taskcluster));
    let github = Arc::new(GraphQlClient::new(&config.github));
    let bind_addr = config.bind_addr;
    let state = AppState::new(pool, config, taskcluster, github);

    serve(admin_router(state), bind_addr, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received");
    })
    .await?;

    info!("Ship It admin API shut down");
    Ok(())
}
