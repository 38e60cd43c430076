// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::{
    DetailsConfig, L10nByRelease, OldProductDetails, ReleaseRecord, get_product_categories,
    history_file_word, without_esr, ymd,
};
use crate::error::{Error, Result};
use crate::product::ProductCategory;
use crate::release::major_of;
use crate::version::parse_version;

/// Products whose releases live in the shared mobile files.
const MOBILE_PRODUCTS: &[&str] = &["fennec", "fenix", "firefox-android"];

fn releases_file(product: &str) -> String {
    if MOBILE_PRODUCTS.contains(&product) {
        "1.0/mobile_android.json".to_string()
    } else {
        format!("1.0/{}.json", product)
    }
}

fn history_file(product: &str, category: ProductCategory) -> String {
    let prefix = if MOBILE_PRODUCTS.contains(&product) {
        "mobile"
    } else {
        product
    };
    format!("1.0/{}_history_{}_releases.json", prefix, history_file_word(category))
}

/// Old entries are kept when they predate the breakpoint. Versions too old
/// for today's parsers only need their leading major number.
fn below_breakpoint(version: &str, breakpoint: u32) -> bool {
    major_of(version).is_none_or(|major| major < breakpoint)
}

/// `{"releases": {"<product>-<version>": details}}` for the given products.
pub fn get_releases(
    breakpoint: u32,
    products: &[&str],
    releases: &[ReleaseRecord],
    old_product_details: &OldProductDetails,
    config: &DetailsConfig,
) -> Result<Value> {
    let mut details = Map::new();

    for product in products {
        let old_releases = old_product_details
            .get(&releases_file(product))
            .and_then(|file| file.get("releases"))
            .and_then(Value::as_object);
        for (product_with_version, entry) in old_releases.into_iter().flatten() {
            let (product_string, version_string) =
                product_with_version.rsplit_once('-').ok_or_else(|| {
                    Error::ProductDetails(format!(
                        "Invalid product_with_version \"{}\". It must contain a -",
                        product_with_version
                    ))
                })?;
            // fennec and fenix share a file; only take our own entries
            if !product_string.eq_ignore_ascii_case(product) {
                continue;
            }
            if below_breakpoint(version_string, breakpoint) {
                details.insert(product_with_version.clone(), entry.clone());
            }
        }

        for release in releases.iter().filter(|r| r.product == *product) {
            let Some(category) = get_product_categories(&release.product, &release.version, config)
                .last()
                .copied()
            else {
                continue;
            };
            details.insert(
                format!("{}-{}", release.product, release.version),
                json!({
                    "category": category.as_str(),
                    "product": release.product,
                    "build_number": release.build_number,
                    "description": null,
                    "is_security_driven": false,
                    "version": without_esr(&release.version),
                    "date": ymd(release.completed),
                }),
            );
        }
    }

    Ok(json!({ "releases": details }))
}

/// Release dates of one category, ordered by date.
pub fn get_release_history(
    breakpoint: u32,
    product: &str,
    category: ProductCategory,
    releases: &[ReleaseRecord],
    old_product_details: &OldProductDetails,
) -> Result<Value> {
    if product == "devedition" {
        return Err(Error::ProductDetails(format!(
            "We don't generate product history for \"{}\" product.",
            product
        )));
    }
    if category == ProductCategory::Esr {
        return Err(Error::ProductDetails(format!(
            "We don't generate product history for \"{}\" product category.",
            category.as_str()
        )));
    }

    let mut history: BTreeMap<String, String> = BTreeMap::new();

    let file = history_file(product, category);
    if let Some(Value::Object(old)) = old_product_details.get(&file) {
        for (version, date) in old {
            if !below_breakpoint(version, breakpoint) {
                continue;
            }
            let date = date.as_str().ok_or_else(|| {
                Error::ProductDetails(format!(
                    "Release date of {} in {} is not a string: {}",
                    version, file, date
                ))
            })?;
            history.insert(version.clone(), date.to_string());
        }
    }

    for release in releases {
        if release.product != product || release.status != "shipped" {
            continue;
        }
        let version = parse_version(&release.product, &release.version)?;
        if version.major_number() < breakpoint {
            continue;
        }

        let is_beta = version.beta_number().is_some();
        let has_patch = version.patch_number().is_some();
        // 125.0.1 shipped as a major release
        let special_major = version.major_number() == 125
            && version.patch_number() == Some(1)
            && !is_beta
            && !version.is_esr();
        let fits = match category {
            ProductCategory::Major => special_major || !(has_patch || is_beta || version.is_esr()),
            ProductCategory::Development => is_beta && !version.is_esr(),
            ProductCategory::Stability => !is_beta && has_patch,
            ProductCategory::Esr => false,
        };
        if !fits {
            continue;
        }

        history.insert(
            without_esr(&release.version).to_string(),
            ymd(release.completed),
        );
    }

    let mut entries: Vec<(String, String)> = history.into_iter().collect();
    entries.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(Value::Object(
        entries
            .into_iter()
            .map(|(version, date)| (version, Value::String(date)))
            .collect(),
    ))
}

/// Locales built for each current version.
///
/// `versions` is the product's versions file (`firefox_versions.json` or
/// `thunderbird_versions.json`).
pub fn get_primary_builds(
    product: &str,
    releases: &[ReleaseRecord],
    releases_l10n: &L10nByRelease,
    versions: &Map<String, Value>,
) -> Result<Value> {
    let (products, keys, optional_keys): (&[&str], &[&str], &[&str]) = match product {
        "firefox" => (
            &["firefox", "devedition"],
            &[
                "FIREFOX_NIGHTLY",
                "FIREFOX_DEVEDITION",
                "LATEST_FIREFOX_RELEASED_DEVEL_VERSION",
                "LATEST_FIREFOX_VERSION",
                "FIREFOX_ESR",
            ],
            &["FIREFOX_ESR_NEXT", "FIREFOX_ESR115"],
        ),
        "thunderbird" => (
            &["thunderbird"],
            &[
                "LATEST_THUNDERBIRD_VERSION",
                "LATEST_THUNDERBIRD_DEVEL_VERSION",
                "LATEST_THUNDERBIRD_NIGHTLY_VERSION",
                "THUNDERBIRD_ESR",
            ],
            &["THUNDERBIRD_ESR_NEXT"],
        ),
        other => {
            return Err(Error::ProductDetails(format!(
                "We don't generate primary builds for \"{}\" product.",
                other
            )));
        }
    };

    let version_of = |key: &&str| versions.get(*key).and_then(Value::as_str).unwrap_or("");
    let mut wanted: BTreeSet<&str> = keys.iter().map(version_of).collect();
    wanted.extend(optional_keys.iter().map(version_of).filter(|v| !v.is_empty()));

    let filesize = |size: f64| json!({ "filesize": size });
    let build = if product == "thunderbird" {
        json!({"Windows": filesize(25.1), "OS X": filesize(50.8), "Linux": filesize(31.8)})
    } else {
        json!({"Windows": {"filesize": 0}, "OS X": {"filesize": 0}, "Linux": {"filesize": 0}})
    };

    let mut builds = Map::new();
    for release in releases {
        if !products.contains(&release.product.as_str()) || !wanted.contains(release.version.as_str()) {
            continue;
        }
        let locales = releases_l10n
            .get(&release.name)
            .map(|l10n| l10n.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        debug!(release = %release.name, locales = locales.len(), "Adding primary builds");
        // en-US is not listed in the l10n changesets
        for locale in locales.into_iter().chain(std::iter::once("en-US".to_string())) {
            if locale == "ja-JP-mac" {
                continue;
            }
            let entry = builds
                .entry(locale)
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(per_version) = entry {
                per_version.insert(release.version.clone(), build.clone());
            }
        }
    }
    Ok(Value::Object(builds))
}
