// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database migrations for shipit-api.
//!
//! The admin API, the public API and the worker share one schema. Any of
//! them may run the migrations on startup.
//!
//! # Example
//!
//! ```ignore
//! use sqlx::PgPool;
//! use shipit_api::migrations;
//!
//! let pool = PgPool::connect(&database_url).await?;
//! migrations::run(&pool).await?;
//! ```

use sqlx::migrate::{MigrateError, Migrator};

/// PostgreSQL migrator with every shipit migration embedded.
pub static POSTGRES: Migrator = sqlx::migrate!("./migrations");

/// Run PostgreSQL migrations.
///
/// Safe to call multiple times; already-applied migrations are skipped.
pub async fn run(pool: &sqlx::PgPool) -> Result<(), MigrateError> {
    POSTGRES.run(pool).await
}
