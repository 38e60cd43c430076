// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Product details rebuild.
//!
//! A rebuild brings the product details repository up to date, reads the
//! previous data set, gathers shipped releases, l10n changesets and the
//! release schedule, regenerates every file, and pushes the result.

pub mod git;
pub mod l10n;
pub mod schedule;

use serde_json::{Map, Value};
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use shipit_core::product::Product;
use shipit_core::product_details::{
    DetailsConfig, DetailsInput, FileContent, OldProductDetails, ProductDetails, ReleaseRecord,
    create_index_listing, generate, sanity_checks,
};

use crate::config::ProductDetailsConfig;
use crate::db;
use crate::error::{Error, Result};
use git::WorkingCopy;
use l10n::L10nFetcher;
use schedule::ScheduleClient;

/// Branches whose rebuilds must not lose l10n data.
const STRICT_BRANCHES: &[&str] = &["production", "staging"];

const COMMIT_MESSAGE: &str = "Updating product details";

// ============================================================================
// Reading and writing data sets
// ============================================================================

/// Every JSON file under `dir`, keyed by its `/`-separated relative path.
/// A missing directory is an empty data set.
pub fn read_product_details(dir: &Path) -> Result<OldProductDetails> {
    let mut details = OldProductDetails::new();
    if dir.is_dir() {
        read_json_files(dir, dir, &mut details)?;
    }
    Ok(details)
}

fn read_json_files(root: &Path, dir: &Path, details: &mut OldProductDetails) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            read_json_files(root, &path, details)?;
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let content = std::fs::read(&path)?;
        details.insert(key, serde_json::from_slice(&content)?);
    }
    Ok(())
}

/// Recursively sort object keys.
fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Escape non-ASCII characters as `\uXXXX`. In serialized JSON they can
/// only occur inside strings.
fn escape_non_ascii(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii() {
            escaped.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                escaped.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    escaped
}

/// JSON text of a data set file: 4-space indentation, ASCII only.
pub fn render_json(value: &Value) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    serde::Serialize::serialize(value, &mut serializer)?;
    Ok(escape_non_ascii(&String::from_utf8_lossy(&buf)))
}

/// Write a data set under `dir`. Plain JSON files get sorted keys; release
/// histories keep their date order.
pub fn write_product_details(dir: &Path, details: &ProductDetails) -> Result<()> {
    for (file, content) in details {
        let path = dir.join(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = match content {
            FileContent::Json(value) => render_json(&sort_keys(value))?,
            FileContent::OrderedJson(value) => render_json(value)?,
            FileContent::Html(html) => html.clone(),
        };
        std::fs::write(&path, text)?;
    }
    Ok(())
}

/// Replace the contents of `target` with the contents of `staging`.
fn replace_folder(target: &Path, staging: &Path) -> Result<()> {
    std::fs::create_dir_all(target)?;
    for entry in std::fs::read_dir(target)? {
        let path = entry?.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    for entry in std::fs::read_dir(staging)? {
        let entry = entry?;
        std::fs::rename(entry.path(), target.join(entry.file_name()))?;
    }
    std::fs::remove_dir_all(staging)?;
    Ok(())
}

// ============================================================================
// Rebuild
// ============================================================================

/// Nightly builds of Firefox and Thunderbird, for primary builds.
pub fn nightly_records(firefox_nightly: &str, thunderbird_nightly: &str) -> Vec<ReleaseRecord> {
    [
        (Product::Firefox, firefox_nightly, "mozilla-central"),
        (Product::Thunderbird, thunderbird_nightly, "comm-central"),
    ]
    .into_iter()
    .map(|(product, version, branch)| ReleaseRecord {
        name: format!("{}-{}-nightly", product.capitalized(), version),
        product: product.as_str().to_string(),
        version: version.to_string(),
        branch: branch.to_string(),
        revision: "default".to_string(),
        build_number: 0,
        status: String::new(),
        created: None,
        completed: None,
    })
    .collect()
}

/// Release train settings of a rebuild.
pub fn details_config(config: &ProductDetailsConfig, breakpoint_version: u32) -> DetailsConfig {
    let defaults = DetailsConfig::default();
    DetailsConfig {
        breakpoint_version,
        current_esr: config.current_esr.clone().unwrap_or(defaults.current_esr.clone()),
        esr_next: config.esr_next.clone(),
        ..defaults
    }
}

async fn nightly_version(pool: &PgPool, product: &str) -> Result<String> {
    db::get_version(pool, product, "nightly")
        .await?
        .ok_or_else(|| Error::NotFound(format!("No nightly version found for {}", product)))
}

/// Runs product details rebuilds.
pub struct Rebuilder {
    pool: PgPool,
    config: ProductDetailsConfig,
    http: reqwest::Client,
}

impl Rebuilder {
    pub fn new(pool: PgPool, config: ProductDetailsConfig) -> Self {
        Self {
            pool,
            config,
            http: reqwest::Client::new(),
        }
    }

    fn working_copy(&self) -> Option<WorkingCopy> {
        self.config
            .git_repo_url
            .as_deref()
            .map(|url| WorkingCopy::new(&self.config.dir, url, &self.config.git_branch))
    }

    /// Folder of the working copy holding the data set.
    pub fn output_dir(&self) -> PathBuf {
        self.config.dir.join(&self.config.folder_in_repo)
    }

    /// Regenerate the data set and push it. Without a configured repository
    /// the files are only written locally.
    pub async fn rebuild(&self, breakpoint_version: Option<u32>, clean_working_copy: bool) -> Result<()> {
        let working_copy = self.working_copy();
        match &working_copy {
            Some(copy) => copy.sync(clean_working_copy).await?,
            None => warn!("No product details repository configured, writing files locally"),
        }

        let breakpoint = breakpoint_version.unwrap_or(self.config.breakpoint_version);
        info!(breakpoint_version = breakpoint, "Breakpoint version");

        let output_dir = self.output_dir();
        info!(dir = %output_dir.display(), "Reading old product details");
        let old = {
            let dir = output_dir.clone();
            tokio::task::spawn_blocking(move || read_product_details(&dir))
                .await
                .map_err(|e| Error::Internal(e.to_string()))??
        };

        info!("Getting releases from the database");
        let releases = db::shipped_releases_since(&self.pool, breakpoint).await?;
        let firefox_nightly = nightly_version(&self.pool, "firefox").await?;
        let thunderbird_nightly = nightly_version(&self.pool, "thunderbird").await?;
        let nightlies = nightly_records(&firefox_nightly, &thunderbird_nightly);

        info!(releases = releases.len(), "Getting locales from hg.mozilla.org");
        let fetcher = L10nFetcher::new(self.http.clone(), &self.config.hg_prefix)
            .with_cache_dir(self.config.cache_dir.clone())
            .raise_on_failure(STRICT_BRANCHES.contains(&self.config.git_branch.as_str()));
        let releases_l10n = fetcher.fetch_all(&releases).await?;
        let nightly_l10n = fetcher.fetch_all(&nightlies).await?;

        let schedule = ScheduleClient::new(self.http.clone(), &self.config.schedule_url)
            .schedule_dates(&releases, &firefox_nightly)
            .await?;

        let details_config = details_config(&self.config, breakpoint);
        let details = generate(&DetailsInput {
            config: &details_config,
            releases: &releases,
            nightlies: &nightlies,
            releases_l10n: &releases_l10n,
            nightly_l10n: &nightly_l10n,
            old_product_details: &old,
            firefox_nightly_version: &firefox_nightly,
            thunderbird_nightly_version: &thunderbird_nightly,
            schedule: &schedule,
        })?;
        let details = create_index_listing(details);
        sanity_checks(&details)?;

        let staging = self.config.dir.with_extension("new");
        let files = details.len();
        tokio::task::spawn_blocking(move || -> Result<()> {
            if staging.exists() {
                std::fs::remove_dir_all(&staging)?;
            }
            write_product_details(&staging, &details)?;
            replace_folder(&output_dir, &staging)
        })
        .await
        .map_err(|e| Error::Internal(e.to_string()))??;
        info!(files, "Wrote product details");

        if let Some(copy) = working_copy {
            copy.commit_and_push(COMMIT_MESSAGE).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_json() {
        let text = render_json(&sort_keys(&json!({"b": 1, "a": {"d": [], "c": "Español"}}))).unwrap();
        assert_eq!(
            text,
            "{\n    \"a\": {\n        \"c\": \"Espa\\u00f1ol\",\n        \"d\": []\n    },\n    \"b\": 1\n}"
        );
    }

    #[test]
    fn test_escape_astral_characters() {
        assert_eq!(escape_non_ascii("a😀"), "a\\ud83d\\ude00");
    }

    #[test]
    fn test_write_and_read_data_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut details = ProductDetails::new();
        details.insert(
            "1.0/firefox_versions.json".into(),
            FileContent::Json(json!({"LATEST_FIREFOX_VERSION": "130.0.1", "FIREFOX_NIGHTLY": "150.0a1"})),
        );
        details.insert(
            "1.0/firefox_history_major_releases.json".into(),
            FileContent::OrderedJson(json!({"2.0": "2006-10-24", "1.0": "2004-11-09"})),
        );
        details.insert("index.html".into(), FileContent::Html("<html></html>".into()));
        write_product_details(dir.path(), &details).unwrap();

        let versions =
            std::fs::read_to_string(dir.path().join("1.0/firefox_versions.json")).unwrap();
        assert!(versions.find("FIREFOX_NIGHTLY") < versions.find("LATEST_FIREFOX_VERSION"));
        let history =
            std::fs::read_to_string(dir.path().join("1.0/firefox_history_major_releases.json"))
                .unwrap();
        assert!(history.find("2.0") < history.find("1.0"));

        let read = read_product_details(dir.path()).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read["1.0/firefox_versions.json"]["FIREFOX_NIGHTLY"], "150.0a1");
        assert!(!read.contains_key("index.html"));
    }

    #[test]
    fn test_read_missing_dir() {
        let read = read_product_details(Path::new("/nonexistent/product-details")).unwrap();
        assert!(read.is_empty());
    }

    #[test]
    fn test_replace_folder() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("public");
        let staging = root.path().join("staging");
        std::fs::create_dir_all(target.join("stale")).unwrap();
        std::fs::write(target.join("stale/old.json"), "{}").unwrap();
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("new.json"), "{}").unwrap();

        replace_folder(&target, &staging).unwrap();
        assert!(target.join("new.json").exists());
        assert!(!target.join("stale").exists());
        assert!(!staging.exists());
    }

    #[test]
    fn test_nightly_records() {
        let records = nightly_records("150.0a1", "150.0a1");
        assert_eq!(records[0].name, "Firefox-150.0a1-nightly");
        assert_eq!(records[0].branch, "mozilla-central");
        assert_eq!(records[1].product, "thunderbird");
        assert_eq!(records[1].branch, "comm-central");
        assert!(records.iter().all(|r| r.revision == "default"));
    }

    #[test]
    fn test_details_config_overrides() {
        let mut config = crate::config::Config::local("postgres://localhost/shipit").product_details;
        config.current_esr = Some("153".into());
        config.esr_next = Some("160".into());
        let details = details_config(&config, 120);
        assert_eq!(details.breakpoint_version, 120);
        assert_eq!(details.current_esr, "153");
        assert_eq!(details.esr_next.as_deref(), Some("160"));
        assert_eq!(details.release_branch, "releases/mozilla-release");
    }
}
