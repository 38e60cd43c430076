// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ship It product details worker.
//!
//! Waits for rebuild requests and regenerates the product details data set.

use std::sync::Arc;
use tracing::{info, warn};

use shipit_api::config::Config;
use shipit_api::migrations;
use shipit_api::product_details::Rebuilder;
use shipit_api::worker::{RebuildWorker, RebuildWorkerConfig};

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
        app_channel = %config.app_channel,
        git_branch = %config.product_details.git_branch,
        dir = %config.product_details.dir.display(),
        "Starting Ship It product details worker"
    );

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    info!("Connected to database");

    migrations::run(&pool).await?;

    let rebuilder = Arc::new(Rebuilder::new(pool.clone(), config.product_details.clone()));
    let worker = RebuildWorker::new(
        pool,
        rebuilder,
        RebuildWorkerConfig {
            poll_interval: config.worker_poll_interval,
            ..Default::default()
        },
    );
    let shutdown = worker.shutdown_handle();
    let handle = tokio::spawn(worker.run());

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    shutdown.notify_one();
    handle.await?;

    info!("Ship It product details worker shut down");
    Ok(())
}
