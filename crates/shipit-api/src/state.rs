// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared application state for handlers.

use sqlx::PgPool;
use std::sync::Arc;

use crate::auth::Authenticator;
use crate::config::Config;
use crate::github::GitHub;
use crate::notify::Notifier;
use crate::taskcluster::{Decisions, Taskcluster};

/// Handler state; cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub taskcluster: Arc<dyn Taskcluster>,
    pub decisions: Arc<Decisions>,
    pub github: Arc<dyn GitHub>,
    pub authenticator: Arc<Authenticator>,
    pub notifier: Arc<Notifier>,
    /// Plain HTTP client for hg.mozilla.org lookups.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: Config,
        taskcluster: Arc<dyn Taskcluster>,
        github: Arc<dyn GitHub>,
    ) -> Self {
        let authenticator = Authenticator::new(&config.auth, taskcluster.clone(), &config.admin_group);
        let notifier = Notifier::new(config.notify.clone(), taskcluster.clone());
        Self {
            pool,
            decisions: Arc::new(Decisions::new(taskcluster.clone())),
            authenticator: Arc::new(authenticator),
            notifier: Arc::new(notifier),
            config: Arc::new(config),
            http: reqwest::Client::new(),
            taskcluster,
            github,
        }
    }

    /// `by-env` key of the deployment channel.
    pub fn environment(&self) -> &'static str {
        shipit_core::merge::environment_for_channel(&self.config.app_channel)
    }
}
