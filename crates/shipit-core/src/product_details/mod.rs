// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Product details generators.
//!
//! Product details is a static JSON data set (`1.0/*.json`) describing every
//! shipped release. Files are rebuilt from shipped releases newer than the
//! breakpoint version; anything older is carried over from the previous data
//! set unchanged.
//!
//! Everything here is pure: the caller fetches releases, l10n changesets and
//! release schedules, and writes the resulting files.

mod categories;
mod files;
mod history;
mod versions;

pub use categories::get_product_categories;
pub use files::{
    create_index_listing, get_l10n, get_languages, get_regions, sanity_checks, thunderbird_beta_builds,
};
pub use history::{get_primary_builds, get_release_history, get_releases};
pub use versions::{
    ScheduleDates, compute_schedule_dates, firefox_versions, get_latest_version, mobile_details,
    mobile_versions, thunderbird_versions,
};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::error::Result;
use crate::product::ProductCategory;

/// A shipped release (or a nightly) as seen by the generators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub name: String,
    pub product: String,
    pub version: String,
    pub branch: String,
    pub revision: String,
    pub build_number: i32,
    pub status: String,
    pub created: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
}

/// One locale entry of `l10n-changesets.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseL10n {
    #[serde(default)]
    pub platforms: Vec<String>,
    pub revision: String,
}

/// Locale → changeset for one release.
pub type ReleaseL10ns = BTreeMap<String, ReleaseL10n>;

/// l10n changesets keyed by release name.
pub type L10nByRelease = HashMap<String, ReleaseL10ns>;

/// Content of one generated file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileContent {
    /// Written with sorted keys.
    Json(Value),
    /// Written in insertion order (release histories are ordered by date).
    OrderedJson(Value),
    Html(String),
}

impl FileContent {
    pub fn json(&self) -> Option<&Value> {
        match self {
            FileContent::Json(v) | FileContent::OrderedJson(v) => Some(v),
            FileContent::Html(_) => None,
        }
    }
}

/// Relative path → content of the generated data set.
pub type ProductDetails = BTreeMap<String, FileContent>;

/// Relative path → parsed JSON of the previous data set.
pub type OldProductDetails = BTreeMap<String, Value>;

/// Release train settings.
#[derive(Debug, Clone)]
pub struct DetailsConfig {
    /// Releases with a lower major version are served from the old data set.
    pub breakpoint_version: u32,
    pub current_esr: String,
    /// Major version of the next ESR while two ESR trains overlap.
    pub esr_next: Option<String>,
    pub latest_firefox_older_version: String,
    pub firefox_aurora: String,
    pub ios_beta_version: String,
    pub ios_version: String,
    pub latest_thunderbird_alpha_version: String,
    pub release_branch: String,
    pub beta_branch: String,
    pub esr_branch_prefix: String,
    pub thunderbird_release_branch: String,
    pub thunderbird_beta_branch: String,
    pub thunderbird_esr_branch_prefix: String,
}

impl Default for DetailsConfig {
    fn default() -> Self {
        Self {
            breakpoint_version: 114,
            current_esr: "140".to_string(),
            esr_next: None,
            latest_firefox_older_version: "3.6.28".to_string(),
            firefox_aurora: String::new(),
            ios_beta_version: String::new(),
            ios_version: String::new(),
            latest_thunderbird_alpha_version: "54.0a2".to_string(),
            release_branch: "releases/mozilla-release".to_string(),
            beta_branch: "releases/mozilla-beta".to_string(),
            esr_branch_prefix: "releases/mozilla-esr".to_string(),
            thunderbird_release_branch: "releases/comm-release".to_string(),
            thunderbird_beta_branch: "releases/comm-beta".to_string(),
            thunderbird_esr_branch_prefix: "releases/comm-esr".to_string(),
        }
    }
}

/// Everything a rebuild gathered before generating files.
#[derive(Debug, Clone)]
pub struct DetailsInput<'a> {
    pub config: &'a DetailsConfig,
    /// Shipped releases at or above the breakpoint.
    pub releases: &'a [ReleaseRecord],
    /// Current Firefox and Thunderbird nightlies.
    pub nightlies: &'a [ReleaseRecord],
    pub releases_l10n: &'a L10nByRelease,
    pub nightly_l10n: &'a L10nByRelease,
    pub old_product_details: &'a OldProductDetails,
    pub firefox_nightly_version: &'a str,
    pub thunderbird_nightly_version: &'a str,
    pub schedule: &'a ScheduleDates,
}

/// Generate the complete data set: every file under `1.0/` plus an
/// `index.html` per folder. Sanity checks run on the result.
pub fn generate(input: &DetailsInput<'_>) -> Result<ProductDetails> {
    let config = input.config;
    let releases = input.releases;
    let old = input.old_product_details;
    let breakpoint = config.breakpoint_version;

    let firefox = firefox_versions(config, releases, input.firefox_nightly_version, input.schedule);
    let thunderbird = thunderbird_versions(config, releases, input.thunderbird_nightly_version);

    let combined_releases: Vec<ReleaseRecord> =
        releases.iter().chain(input.nightlies.iter()).cloned().collect();
    let mut combined_l10n = input.releases_l10n.clone();
    combined_l10n.extend(input.nightly_l10n.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut details: ProductDetails = BTreeMap::new();
    let mut json = |file: &str, value: Value| {
        details.insert(file.to_string(), FileContent::Json(value));
    };

    json(
        "all.json",
        get_releases(
            breakpoint,
            &["devedition", "firefox", "fenix", "fennec", "thunderbird"],
            releases,
            old,
            config,
        )?,
    );
    json("devedition.json", get_releases(breakpoint, &["devedition"], releases, old, config)?);
    json("firefox.json", get_releases(breakpoint, &["firefox"], releases, old, config)?);
    json(
        "firefox_primary_builds.json",
        get_primary_builds("firefox", &combined_releases, &combined_l10n, &firefox)?,
    );
    json("firefox_versions.json", Value::Object(firefox.clone()));
    json("languages.json", get_languages(old)?);
    json(
        "mobile_android.json",
        get_releases(
            breakpoint,
            &["fennec", "fenix", "firefox-android"],
            releases,
            old,
            config,
        )?,
    );
    json(
        "mobile_details.json",
        mobile_details(config, releases, input.firefox_nightly_version)?,
    );
    json(
        "mobile_versions.json",
        Value::Object(mobile_versions(config, releases, input.firefox_nightly_version)),
    );
    json("thunderbird.json", get_releases(breakpoint, &["thunderbird"], releases, old, config)?);
    json("thunderbird_beta_builds.json", thunderbird_beta_builds());
    json(
        "thunderbird_primary_builds.json",
        get_primary_builds("thunderbird", &combined_releases, &combined_l10n, &thunderbird)?,
    );
    json("thunderbird_versions.json", Value::Object(thunderbird.clone()));

    for (product, prefix) in [("firefox", "firefox"), ("fennec", "mobile"), ("thunderbird", "thunderbird")] {
        for category in [
            ProductCategory::Development,
            ProductCategory::Major,
            ProductCategory::Stability,
        ] {
            let file = format!("{}_history_{}_releases.json", prefix, history_file_word(category));
            let history = get_release_history(breakpoint, product, category, releases, old)?;
            details.insert(file, FileContent::OrderedJson(history));
        }
    }

    for (file, content) in get_regions(old) {
        details.insert(file, FileContent::Json(content));
    }
    for (file, content) in get_l10n(releases, input.releases_l10n, old) {
        details.insert(file, FileContent::Json(content));
    }

    let prefixed: ProductDetails = details
        .into_iter()
        .map(|(file, content)| (format!("1.0/{}", file), content))
        .collect();
    let listed = create_index_listing(prefixed);
    sanity_checks(&listed)?;
    Ok(listed)
}

/// Word used in history file names for a category.
pub(crate) fn history_file_word(category: ProductCategory) -> &'static str {
    match category {
        ProductCategory::Major => "major",
        ProductCategory::Development => "development",
        ProductCategory::Stability => "stability",
        ProductCategory::Esr => "esr",
    }
}

/// `YYYY-MM-DD` of an optional timestamp, empty when missing.
pub(crate) fn ymd(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

/// ISO 8601 of an optional timestamp, empty when missing.
pub(crate) fn iso(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.to_rfc3339_opts(SecondsFormat::AutoSi, false))
        .unwrap_or_default()
}

/// Strip a trailing `esr` marker.
pub(crate) fn without_esr(version: &str) -> &str {
    version.strip_suffix("esr").unwrap_or(version)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn release(product: &str, version: &str, branch: &str, completed: (i32, u32, u32)) -> ReleaseRecord {
        let (y, m, d) = completed;
        ReleaseRecord {
            name: crate::release::release_name(product, version, 1),
            product: product.to_string(),
            version: version.to_string(),
            branch: branch.to_string(),
            revision: "abcdef123456".to_string(),
            build_number: 1,
            status: "shipped".to_string(),
            created: Some(Utc.with_ymd_and_hms(y, m, d, 8, 0, 0).unwrap()),
            completed: Some(Utc.with_ymd_and_hms(y, m, d, 12, 30, 0).unwrap()),
        }
    }

    pub fn locales(count: usize) -> ReleaseL10ns {
        (0..count)
            .map(|i| {
                (
                    format!("l{:02}", i),
                    ReleaseL10n {
                        platforms: vec!["linux".to_string()],
                        revision: format!("rev{}", i),
                    },
                )
            })
            .collect()
    }
}
