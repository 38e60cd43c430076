// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ship It API - release shipping coordination.
//!
//! Ship It tracks product and XPI releases through their phases, collects
//! signoffs, triggers the Taskcluster action hooks that ship each phase, and
//! keeps the product details data set in sync with shipped releases.
//!
//! # Components
//!
//! | Binary | Description |
//! |--------|-------------|
//! | `shipit-admin-api` | Authenticated API used by the release UI and automation |
//! | `shipit-public-api` | Read-only release data, no authentication |
//! | `shipit-worker` | Runs queued product details rebuilds |
//!
//! All three share one PostgreSQL schema. Release rules (versions, phases,
//! scopes, hook rendering, product details generation) live in
//! `shipit-core`; this crate adds persistence, HTTP and the external
//! clients.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod github;
pub mod handlers;
pub mod migrations;
pub mod notify;
pub mod product_details;
pub mod retry;
pub mod server;
pub mod state;
pub mod taskcluster;
pub mod worker;

pub use error::{Error, Result};
