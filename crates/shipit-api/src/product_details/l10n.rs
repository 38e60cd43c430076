// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! l10n changesets of releases, read from hg.mozilla.org.

use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use shipit_core::product::product_to_appname;
use shipit_core::product_details::{L10nByRelease, ReleaseL10ns, ReleaseRecord};

use crate::error::Result;
use crate::retry::{RetryConfig, retry_with_backoff};

/// hg.mozilla.org does not like more connections than this.
const FETCH_CONCURRENCY: usize = 50;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

const LOCALES_TIMEOUT: Duration = Duration::from_secs(10);

/// comm-beta revisions that were built without in-tree l10n changesets.
const THUNDERBIRD_BETA_REVISIONS_WITHOUT_L10N: &[&str] = &[
    "3e01e0dc6943",
    "481fea2011e6",
    "85cb8f907b18",
    "92950b2fd2dc",
    "c614b6e7cf58",
    "e277e3f0ab13",
    "efd290b55a35",
    "f87ba53e04ff",
];

/// `{hg}/{branch}/raw-file/{revision}/{appname}/locales/l10n-changesets.json`
pub fn changesets_url(hg_prefix: &str, branch: &str, revision: &str, appname: &str) -> String {
    format!(
        "{}/{}/raw-file/{}/{}/locales/l10n-changesets.json",
        hg_prefix.trim_end_matches('/'),
        branch,
        revision,
        appname
    )
}

/// Locales shipped by a revision.
pub async fn get_locales(
    client: &reqwest::Client,
    hg_prefix: &str,
    branch: &str,
    revision: &str,
    appname: &str,
) -> Result<Vec<String>> {
    let url = changesets_url(hg_prefix, branch, revision, appname);
    let changesets: Map<String, Value> = client
        .get(&url)
        .timeout(LOCALES_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(changesets.keys().cloned().collect())
}

/// Whether a release carries l10n changesets in its repository.
pub fn has_l10n(release: &ReleaseRecord) -> bool {
    if product_to_appname(&release.product).is_none() {
        return false;
    }
    !(release.product == "thunderbird"
        && release.branch == "releases/comm-beta"
        && THUNDERBIRD_BETA_REVISIONS_WITHOUT_L10N.contains(&release.revision.as_str()))
}

/// Fetches l10n changesets of many releases at once, through an on-disk
/// cache keyed by the sha256 of the URL.
pub struct L10nFetcher {
    client: reqwest::Client,
    hg_prefix: String,
    cache_dir: Option<PathBuf>,
    raise_on_failure: bool,
    retry: RetryConfig,
}

impl L10nFetcher {
    pub fn new(client: reqwest::Client, hg_prefix: &str) -> Self {
        Self {
            client,
            hg_prefix: hg_prefix.to_string(),
            cache_dir: None,
            raise_on_failure: false,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_cache_dir(mut self, cache_dir: PathBuf) -> Self {
        self.cache_dir = Some(cache_dir.join("fetch_l10n_data"));
        self
    }

    /// Make fetch failures fatal instead of yielding empty changesets.
    pub fn raise_on_failure(mut self, raise: bool) -> Self {
        self.raise_on_failure = raise;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Changesets of every release that has l10n, keyed by release name.
    pub async fn fetch_all(&self, releases: &[ReleaseRecord]) -> Result<L10nByRelease> {
        // Futures are built up front (they stay lazy) to avoid a rustc
        // higher-ranked lifetime inference failure with stream closures.
        let fetches: Vec<_> = releases
            .iter()
            .filter(|r| has_l10n(r))
            .map(|release| async move { (release.name.clone(), self.fetch(release).await) })
            .collect();
        let results: Vec<(String, Result<ReleaseL10ns>)> = stream::iter(fetches)
        .buffer_unordered(FETCH_CONCURRENCY)
        .collect()
        .await;

        let mut l10n = L10nByRelease::new();
        for (name, result) in results {
            match result {
                Ok(changesets) => {
                    l10n.insert(name, changesets);
                }
                Err(e) if self.raise_on_failure => return Err(e),
                Err(e) => {
                    info!(release = %name, error = %e, "Failed to fetch l10n changesets");
                    l10n.insert(name, ReleaseL10ns::new());
                }
            }
        }
        Ok(l10n)
    }

    async fn fetch(&self, release: &ReleaseRecord) -> Result<ReleaseL10ns> {
        let appname = product_to_appname(&release.product).unwrap_or("browser");
        let url = changesets_url(&self.hg_prefix, &release.branch, &release.revision, appname);

        let cache = self
            .cache_dir
            .as_ref()
            .map(|dir| dir.join(hex::encode(Sha256::digest(url.as_bytes()))));
        if let Some(cache) = &cache {
            if let Ok(bytes) = tokio::fs::read(cache).await {
                debug!(url = %url, "l10n cache hit");
                return Ok(serde_json::from_slice(&bytes)?);
            }
        }

        debug!(url = %url, "Fetching l10n changesets");
        let client = &self.client;
        let target = url.as_str();
        let changesets: ReleaseL10ns = retry_with_backoff(&self.retry, target, move || async move {
            client
                .get(target)
                .timeout(FETCH_TIMEOUT)
                .send()
                .await?
                .error_for_status()?
                .json::<ReleaseL10ns>()
                .await
        })
        .await?;

        if let Some(cache) = &cache {
            if let Some(dir) = cache.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }
            if let Err(e) = tokio::fs::write(cache, serde_json::to_vec(&changesets)?).await {
                warn!(url = %url, error = %e, "Failed to cache l10n changesets");
            }
        }
        Ok(changesets)
    }
}
