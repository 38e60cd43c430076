// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::info;

use super::{DetailsConfig, ReleaseRecord};
use crate::error::{Error, Result};
use crate::version::{Version, parse_version};

const MOBILE_DETAILS_TEMPLATE: &str = include_str!("mobile_details.json");

/// Freeze, merge and release dates around the current nightly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ScheduleDates {
    pub last_softfreeze_date: String,
    pub last_stringfreeze_date: String,
    pub last_merge_date: String,
    pub last_release_date: String,
    pub next_softfreeze_date: String,
    pub next_stringfreeze_date: String,
    pub next_merge_date: String,
    pub next_release_date: String,
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&text.replacen(' ', "T", 1)) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| Error::ProductDetails(format!("Invalid schedule date: {}", text)))
}

fn schedule_field(schedule: &Value, field: &str) -> Result<DateTime<Utc>> {
    let text = schedule
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::ProductDetails(format!("Release schedule has no {}", field)))?;
    parse_timestamp(text)
}

fn ymd(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn day_after(date: DateTime<Utc>) -> String {
    (date.date_naive() + Duration::days(1)).format("%Y-%m-%d").to_string()
}

/// Compute schedule dates from the release schedules of the current nightly
/// major (`current`) and the one before (`previous`).
///
/// The last release date is the date of the first Firefox release shipped
/// after the previous merge day, or the day after that merge when nothing
/// shipped yet.
pub fn compute_schedule_dates(
    releases: &[ReleaseRecord],
    current: &Value,
    previous: &Value,
) -> Result<ScheduleDates> {
    let last_softfreeze = schedule_field(previous, "soft_code_freeze")?;
    let last_merge = schedule_field(previous, "merge_day")?;
    let next_softfreeze = schedule_field(current, "soft_code_freeze")?;
    let next_merge = schedule_field(current, "merge_day")?;

    let mut shipped_after_merge: Vec<(Version, DateTime<Utc>)> = releases
        .iter()
        .filter(|r| r.product == "firefox" && r.status == "shipped")
        .filter_map(|r| {
            let version = Version::parse_gecko(&r.version).ok()?;
            let completed = r.completed?;
            (version.is_release() && completed > last_merge).then_some((version, completed))
        })
        .collect();
    shipped_after_merge.sort_by(|a, b| a.0.cmp(&b.0));

    let last_release_date = match shipped_after_merge.first() {
        Some((_, completed)) => ymd(*completed),
        None => {
            let assumed = day_after(last_merge);
            info!(
                last_merge_date = %ymd(last_merge),
                assumed_release_date = %assumed,
                "No Firefox releases shipped after the last merge date"
            );
            assumed
        }
    };

    Ok(ScheduleDates {
        last_softfreeze_date: ymd(last_softfreeze),
        last_stringfreeze_date: day_after(last_softfreeze),
        last_merge_date: ymd(last_merge),
        last_release_date,
        next_softfreeze_date: ymd(next_softfreeze),
        next_stringfreeze_date: day_after(next_softfreeze),
        next_merge_date: ymd(next_merge),
        next_release_date: ymd(next_merge + Duration::days(1)),
    })
}

/// Highest shipped version of a product, optionally on one branch and
/// matching `filter`. Empty when nothing matches.
pub fn get_latest_version<F>(
    releases: &[ReleaseRecord],
    product: &str,
    branch: Option<&str>,
    filter: F,
) -> String
where
    F: Fn(&Version) -> bool,
{
    releases
        .iter()
        .filter(|r| r.product == product && branch.is_none_or(|b| r.branch == b))
        .filter_map(|r| {
            let version = parse_version(product, &r.version).ok()?;
            filter(&version).then_some((version, r))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, r)| r.version.clone())
        .unwrap_or_default()
}

fn latest_on_branch(releases: &[ReleaseRecord], product: &str, branch: &str) -> String {
    get_latest_version(releases, product, Some(branch), |_| true)
}

fn esr_next_version(
    releases: &[ReleaseRecord],
    product: &str,
    prefix: &str,
    esr_next: Option<&str>,
) -> String {
    match esr_next.filter(|n| !n.is_empty()) {
        Some(next) => latest_on_branch(releases, product, &format!("{}{}", prefix, next)),
        None => String::new(),
    }
}

/// `firefox_versions.json`
pub fn firefox_versions(
    config: &DetailsConfig,
    releases: &[ReleaseRecord],
    nightly_version: &str,
    schedule: &ScheduleDates,
) -> Map<String, Value> {
    let beta = latest_on_branch(releases, "firefox", &config.beta_branch);
    let mut versions = Map::new();
    let mut set = |key: &str, value: String| {
        versions.insert(key.to_string(), Value::String(value));
    };
    set("FIREFOX_NIGHTLY", nightly_version.to_string());
    set("FIREFOX_AURORA", config.firefox_aurora.clone());
    set(
        "LATEST_FIREFOX_VERSION",
        latest_on_branch(releases, "firefox", &config.release_branch),
    );
    set(
        "FIREFOX_ESR",
        latest_on_branch(
            releases,
            "firefox",
            &format!("{}{}", config.esr_branch_prefix, config.current_esr),
        ),
    );
    set(
        "FIREFOX_ESR_NEXT",
        esr_next_version(releases, "firefox", &config.esr_branch_prefix, config.esr_next.as_deref()),
    );
    set(
        "FIREFOX_ESR115",
        esr_next_version(releases, "firefox", &config.esr_branch_prefix, Some("115")),
    );
    set("LATEST_FIREFOX_DEVEL_VERSION", beta.clone());
    set("LATEST_FIREFOX_RELEASED_DEVEL_VERSION", beta);
    set(
        "FIREFOX_DEVEDITION",
        latest_on_branch(releases, "devedition", &config.beta_branch),
    );
    set("LATEST_FIREFOX_OLDER_VERSION", config.latest_firefox_older_version.clone());

    if let Ok(Value::Object(dates)) = serde_json::to_value(schedule) {
        versions.extend(dates);
    }
    versions
}

/// `thunderbird_versions.json`
pub fn thunderbird_versions(
    config: &DetailsConfig,
    releases: &[ReleaseRecord],
    nightly_version: &str,
) -> Map<String, Value> {
    let mut versions = Map::new();
    versions.insert(
        "LATEST_THUNDERBIRD_VERSION".into(),
        json!(latest_on_branch(releases, "thunderbird", &config.thunderbird_release_branch)),
    );
    versions.insert(
        "LATEST_THUNDERBIRD_DEVEL_VERSION".into(),
        json!(latest_on_branch(releases, "thunderbird", &config.thunderbird_beta_branch)),
    );
    versions.insert("LATEST_THUNDERBIRD_NIGHTLY_VERSION".into(), json!(nightly_version));
    versions.insert(
        "LATEST_THUNDERBIRD_ALPHA_VERSION".into(),
        json!(config.latest_thunderbird_alpha_version),
    );
    versions.insert(
        "THUNDERBIRD_ESR".into(),
        json!(latest_on_branch(
            releases,
            "thunderbird",
            &format!("{}{}", config.thunderbird_esr_branch_prefix, config.current_esr)
        )),
    );
    versions.insert(
        "THUNDERBIRD_ESR_NEXT".into(),
        json!(esr_next_version(
            releases,
            "thunderbird",
            &config.thunderbird_esr_branch_prefix,
            config.esr_next.as_deref()
        )),
    );
    versions
}

/// `mobile_versions.json`
pub fn mobile_versions(
    config: &DetailsConfig,
    releases: &[ReleaseRecord],
    nightly_version: &str,
) -> Map<String, Value> {
    let mut versions = Map::new();
    versions.insert("ios_beta_version".into(), json!(config.ios_beta_version));
    versions.insert("ios_version".into(), json!(config.ios_version));
    versions.insert("nightly_version".into(), json!(nightly_version));
    versions.insert("alpha_version".into(), json!(nightly_version));
    versions.insert(
        "beta_version".into(),
        json!(get_latest_version(releases, "firefox-android", None, Version::is_beta)),
    );
    versions.insert(
        "version".into(),
        json!(get_latest_version(releases, "firefox-android", None, Version::is_release)),
    );
    versions
}

/// `mobile_details.json`: the static locale lists plus the mobile versions.
pub fn mobile_details(
    config: &DetailsConfig,
    releases: &[ReleaseRecord],
    nightly_version: &str,
) -> Result<Value> {
    let mut details: Map<String, Value> = serde_json::from_str(MOBILE_DETAILS_TEMPLATE)
        .map_err(|e| Error::ProductDetails(format!("Invalid mobile details template: {}", e)))?;
    details.extend(mobile_versions(config, releases, nightly_version));
    Ok(Value::Object(details))
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::release;
    use super::*;

    #[test]
    fn test_get_latest_version_sorts_by_version() {
        let releases = vec![
            release("firefox", "130.0.1", "releases/mozilla-release", (2024, 9, 17)),
            release("firefox", "130.0", "releases/mozilla-release", (2024, 9, 3)),
            // correction release for old users, shipped later
            release("firefox", "115.15.1", "releases/mozilla-release", (2024, 9, 20)),
            release("firefox", "131.0b5", "releases/mozilla-beta", (2024, 9, 10)),
        ];
        assert_eq!(
            get_latest_version(&releases, "firefox", Some("releases/mozilla-release"), |_| true),
            "130.0.1"
        );
        assert_eq!(get_latest_version(&releases, "firefox", None, |_| true), "131.0b5");
        assert_eq!(get_latest_version(&releases, "thunderbird", None, |_| true), "");
    }

    #[test]
    fn test_schedule_dates_with_release_after_merge() {
        let releases = vec![
            release("firefox", "130.0", "r", (2024, 9, 3)),
            release("firefox", "130.0.1", "r", (2024, 9, 17)),
            release("firefox", "131.0b1", "b", (2024, 9, 2)),
        ];
        let previous = json!({"soft_code_freeze": "2024-08-22T00:00:00+00:00", "merge_day": "2024-08-26T00:00:00+00:00"});
        let current = json!({"soft_code_freeze": "2024-09-26 00:00:00+00:00", "merge_day": "2024-09-30"});
        let dates = compute_schedule_dates(&releases, &current, &previous).unwrap();
        assert_eq!(
            dates,
            ScheduleDates {
                last_softfreeze_date: "2024-08-22".into(),
                last_stringfreeze_date: "2024-08-23".into(),
                last_merge_date: "2024-08-26".into(),
                last_release_date: "2024-09-03".into(),
                next_softfreeze_date: "2024-09-26".into(),
                next_stringfreeze_date: "2024-09-27".into(),
                next_merge_date: "2024-09-30".into(),
                next_release_date: "2024-10-01".into(),
            }
        );
    }

    #[test]
    fn test_schedule_dates_without_release_since_merge() {
        let releases = vec![release("firefox", "129.0", "r", (2024, 8, 6))];
        let previous = json!({"soft_code_freeze": "2024-08-22", "merge_day": "2024-08-26"});
        let current = json!({"soft_code_freeze": "2024-09-26", "merge_day": "2024-09-30"});
        let dates = compute_schedule_dates(&releases, &current, &previous).unwrap();
        assert_eq!(dates.last_release_date, "2024-08-27");
        assert!(compute_schedule_dates(&releases, &json!({}), &previous).is_err());
    }

    #[test]
    fn test_versions_files() {
        let config = DetailsConfig::default();
        let releases = vec![
            release("firefox", "130.0", "releases/mozilla-release", (2024, 9, 3)),
            release("firefox", "140.1.0esr", "releases/mozilla-esr140", (2025, 7, 22)),
            release("firefox", "115.26.0esr", "releases/mozilla-esr115", (2025, 7, 22)),
            release("thunderbird", "128.0", "releases/comm-release", (2024, 7, 10)),
            release("firefox-android", "130.0", "releases/mozilla-release", (2024, 9, 3)),
            release("firefox-android", "131.0b4", "releases/mozilla-beta", (2024, 9, 6)),
        ];
        let firefox = firefox_versions(&config, &releases, "132.0a1", &ScheduleDates::default());
        assert_eq!(firefox["FIREFOX_ESR"], json!("140.1.0esr"));
        assert_eq!(firefox["FIREFOX_ESR115"], json!("115.26.0esr"));
        assert_eq!(firefox["FIREFOX_ESR_NEXT"], json!(""));
        assert_eq!(firefox["LATEST_FIREFOX_OLDER_VERSION"], json!("3.6.28"));
        assert!(firefox.contains_key("NEXT_RELEASE_DATE"));

        let thunderbird = thunderbird_versions(&config, &releases, "132.0a1");
        assert_eq!(thunderbird["LATEST_THUNDERBIRD_VERSION"], json!("128.0"));
        assert_eq!(thunderbird["LATEST_THUNDERBIRD_ALPHA_VERSION"], json!("54.0a2"));

        let mobile = mobile_versions(&config, &releases, "132.0a1");
        assert_eq!(mobile["version"], json!("130.0"));
        assert_eq!(mobile["beta_version"], json!("131.0b4"));
        assert_eq!(mobile["alpha_version"], json!("132.0a1"));

        let details = mobile_details(&config, &releases, "132.0a1").unwrap();
        assert_eq!(details["builds"].as_array().unwrap().len(), 31);
        assert_eq!(details["beta_builds"].as_array().unwrap().len(), 12);
        assert_eq!(details["version"], json!("130.0"));
    }
}
