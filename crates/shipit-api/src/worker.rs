// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Product details rebuild worker.
//!
//! Rebuild requests are queued in `shipit_api_rebuild_requests`. The worker
//! wakes up on `NOTIFY rebuild_product_details` or every poll interval,
//! claims everything pending and runs a single rebuild for the batch.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::db::{self, REBUILD_CHANNEL, RebuildRequest};
use crate::error::{Error, Result};
use crate::product_details::Rebuilder;

/// Something that rebuilds product details for a batch of requests.
#[async_trait]
pub trait Rebuild: Send + Sync {
    async fn rebuild(&self, requests: &[RebuildRequest]) -> Result<()>;
}

/// Smallest breakpoint version asked for by any request.
pub fn requested_breakpoint(requests: &[RebuildRequest]) -> Option<u32> {
    requests
        .iter()
        .filter_map(|r| r.payload.get("breakpoint_version")?.as_u64())
        .filter_map(|v| u32::try_from(v).ok())
        .min()
}

#[async_trait]
impl Rebuild for Rebuilder {
    async fn rebuild(&self, requests: &[RebuildRequest]) -> Result<()> {
        Rebuilder::rebuild(self, requested_breakpoint(requests), true).await
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct RebuildWorkerConfig {
    /// How often to look for requests without a notification
    pub poll_interval: Duration,
    /// Maximum requests coalesced into one rebuild
    pub batch_size: i64,
    /// Processed requests older than this are deleted
    pub max_age: Duration,
}

impl Default for RebuildWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            batch_size: 100,
            max_age: Duration::from_secs(7 * 24 * 3600), // 7 days
        }
    }
}

/// Background task running queued rebuilds.
pub struct RebuildWorker {
    pool: PgPool,
    rebuilder: Arc<dyn Rebuild>,
    config: RebuildWorkerConfig,
    shutdown: Arc<Notify>,
}

impl RebuildWorker {
    pub fn new(pool: PgPool, rebuilder: Arc<dyn Rebuild>, config: RebuildWorkerConfig) -> Self {
        Self {
            pool,
            rebuilder,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    async fn listen(&self) -> Option<PgListener> {
        let mut listener = match PgListener::connect_with(&self.pool).await {
            Ok(listener) => listener,
            Err(e) => {
                warn!(error = %e, "Failed to connect rebuild listener, polling only");
                return None;
            }
        };
        match listener.listen(REBUILD_CHANNEL).await {
            Ok(()) => Some(listener),
            Err(e) => {
                warn!(error = %e, channel = REBUILD_CHANNEL, "Failed to listen, polling only");
                None
            }
        }
    }

    /// Run the worker loop.
    pub async fn run(self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Product details worker started"
        );

        let mut listener = self.listen().await;
        loop {
            if let Err(e) = self.process_pending().await {
                error!(error = %e, "Failed to rebuild product details");
            }

            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("Product details worker shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                notification = next_notification(&mut listener) => {
                    if let Err(e) = notification {
                        warn!(error = %e, "Rebuild listener failed");
                    }
                }
            }
        }
    }

    /// Claim pending requests and rebuild once for all of them. Returns the
    /// number of requests processed. Failed requests go back to the queue.
    pub async fn process_pending(&self) -> Result<usize> {
        let requests = db::claim_rebuild_requests(&self.pool, self.config.batch_size).await?;
        if requests.is_empty() {
            debug!("No pending product details rebuilds");
            return Ok(0);
        }

        let ids: Vec<i64> = requests.iter().map(|r| r.id).collect();
        info!(requests = ids.len(), "Rebuilding product details");
        match self.rebuilder.rebuild(&requests).await {
            Ok(()) => {
                db::complete_rebuild_requests(&self.pool, &ids).await?;
                info!(requests = ids.len(), "Product details rebuilt");
                self.prune_processed().await?;
                Ok(ids.len())
            }
            Err(e) => {
                db::release_rebuild_requests(&self.pool, &ids).await?;
                Err(e)
            }
        }
    }

    /// Delete processed requests older than `max_age`.
    async fn prune_processed(&self) -> Result<u64> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.max_age)
                .map_err(|e| Error::Internal(format!("Invalid duration: {}", e)))?;
        let deleted = db::prune_rebuild_requests(&self.pool, cutoff).await?;
        if deleted > 0 {
            debug!(deleted, "Pruned processed rebuild requests");
        }
        Ok(deleted)
    }
}

async fn next_notification(listener: &mut Option<PgListener>) -> std::result::Result<(), sqlx::Error> {
    match listener {
        Some(listener) => listener.recv().await.map(|notification| {
            debug!(payload = notification.payload(), "Rebuild requested");
        }),
        None => std::future::pending().await,
    }
}
