// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Firefox release schedule lookups.

use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use shipit_core::product_details::{ReleaseRecord, ScheduleDates, compute_schedule_dates};
use shipit_core::version::Version;

use crate::error::Result;
use crate::retry::{RetryConfig, retry_with_backoff};

const SCHEDULE_TIMEOUT: Duration = Duration::from_secs(30);

/// Client of the release schedule API (`{url}?version=N`).
pub struct ScheduleClient {
    client: reqwest::Client,
    url: String,
    retry: RetryConfig,
}

impl ScheduleClient {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Schedule document of one Firefox major version.
    pub async fn fetch(&self, major: u32) -> Result<Value> {
        let client = &self.client;
        let url = self.url.as_str();
        let schedule = retry_with_backoff(&self.retry, url, move || async move {
            client
                .get(url)
                .query(&[("version", major)])
                .timeout(SCHEDULE_TIMEOUT)
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await
        })
        .await?;
        debug!(major, "Fetched release schedule");
        Ok(schedule)
    }

    /// Schedule dates around the current Firefox nightly.
    pub async fn schedule_dates(
        &self,
        releases: &[ReleaseRecord],
        firefox_nightly_version: &str,
    ) -> Result<ScheduleDates> {
        let major = Version::parse_gecko(firefox_nightly_version)?.major_number();
        let current = self.fetch(major).await?;
        let previous = self.fetch(major.saturating_sub(1)).await?;
        Ok(compute_schedule_dates(releases, &current, &previous)?)
    }
}
