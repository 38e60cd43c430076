// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};

use super::{FileContent, L10nByRelease, OldProductDetails, ProductDetails, ReleaseRecord, iso};
use crate::error::{Error, Result};

const MIN_PRIMARY_BUILDS: usize = 20;

const FIREFOX_CHECKED_KEYS: [&str; 7] = [
    "FIREFOX_NIGHTLY",
    "FIREFOX_DEVEDITION",
    "FIREFOX_ESR",
    "FIREFOX_ESR115",
    "LATEST_FIREFOX_DEVEL_VERSION",
    "LATEST_FIREFOX_RELEASED_DEVEL_VERSION",
    "LATEST_FIREFOX_VERSION",
];

// Only the release channel locales are listed for Thunderbird.
const THUNDERBIRD_CHECKED_KEYS: [&str; 1] = ["LATEST_THUNDERBIRD_VERSION"];

/// `regions/*.json`, carried over from the previous data set.
pub fn get_regions(old: &OldProductDetails) -> BTreeMap<String, Value> {
    old.iter()
        .filter_map(|(file, content)| {
            file.strip_prefix("1.0/")
                .filter(|rest| rest.starts_with("regions/"))
                .map(|rest| (rest.to_string(), content.clone()))
        })
        .collect()
}

/// `l10n/<release name>.json`: old files plus one per release with known
/// changesets. Devedition never had l10n files.
pub fn get_l10n(
    releases: &[ReleaseRecord],
    releases_l10n: &L10nByRelease,
    old: &OldProductDetails,
) -> BTreeMap<String, Value> {
    let mut data: BTreeMap<String, Value> = old
        .iter()
        .filter_map(|(file, content)| {
            file.strip_prefix("1.0/")
                .filter(|rest| rest.starts_with("l10n/"))
                .map(|rest| (rest.to_string(), content.clone()))
        })
        .collect();

    for release in releases {
        if release.product == "devedition" {
            continue;
        }
        let Some(locales) = releases_l10n.get(&release.name) else {
            continue;
        };
        let locales: Map<String, Value> = locales
            .iter()
            .map(|(locale, l10n)| (locale.clone(), json!({ "changeset": l10n.revision })))
            .collect();
        data.insert(
            format!("l10n/{}.json", release.name),
            json!({
                "locales": locales,
                "submittedAt": iso(release.created),
                "shippedAt": iso(release.completed),
                "name": release.name,
            }),
        );
    }
    data
}

/// `languages.json`, maintained by hand in the previous data set.
pub fn get_languages(old: &OldProductDetails) -> Result<Value> {
    old.get("1.0/languages.json").cloned().ok_or_else(|| {
        Error::ProductDetails("\"1.0/languages.json\" does not exist in old product details".into())
    })
}

/// `thunderbird_beta_builds.json` is kept for compatibility and stays empty.
pub fn thunderbird_beta_builds() -> Value {
    json!({})
}

fn is_dir_name(name: &str) -> bool {
    !(name.ends_with(".json") || name.ends_with(".html"))
}

fn parent_folder(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or(""))
}

fn index_listing_html(folder: &str, items: &BTreeSet<String>) -> String {
    let title = format!("/{}", folder);
    let mut lines = vec![
        "<!doctype html>".to_string(),
        "<html>".to_string(),
        "  <head>".to_string(),
        format!("    <title>Index of {}</title>", title),
        "  </head>".to_string(),
        "  <body>".to_string(),
        format!("    <h1>Index of {}</h1>", title),
        "    <ul>".to_string(),
    ];
    if let Some(parent) = parent_folder(folder) {
        lines.push(format!(
            "      <li><a href=\"/{}\">Parent Directory</a></li>",
            parent
        ));
    }
    for item in items {
        let name = item.rsplit('/').next().unwrap_or(item);
        let label = if is_dir_name(name) {
            format!("{}/", name)
        } else {
            name.to_string()
        };
        lines.push(format!("      <li><a href=\"{0}\">{0}</a></li>", label));
    }
    lines.push("    </ul>".to_string());
    lines.push("  </body>".to_string());
    lines.push("</html>".to_string());

    let mut html = lines.join("\n");
    html.push('\n');
    html
}

/// Add an `index.html` listing to every folder of the data set, the root
/// folder included.
pub fn create_index_listing(details: ProductDetails) -> ProductDetails {
    let mut folders: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for file in details.keys() {
        let mut path = file.as_str();
        while let Some(folder) = parent_folder(path) {
            folders.entry(folder.to_string()).or_default().insert(path.to_string());
            path = folder;
        }
    }

    let mut listed = details;
    for (folder, items) in folders {
        let index = if folder.is_empty() {
            "index.html".to_string()
        } else {
            format!("{}/index.html", folder)
        };
        listed.insert(index, FileContent::Html(index_listing_html(&folder, &items)));
    }
    listed
}

fn json_file<'a>(details: &'a ProductDetails, file: &str) -> Result<&'a Value> {
    details
        .get(file)
        .and_then(FileContent::json)
        .ok_or_else(|| Error::ProductDetails(format!("Missing {}", file)))
}

fn check_primary_builds(
    product: &str,
    versions: &Value,
    primary_builds: &Value,
    keys: &[&str],
) -> Result<()> {
    for key in keys {
        let version = versions.get(*key).and_then(Value::as_str).unwrap_or("");
        if version.is_empty() {
            continue;
        }
        let builds = primary_builds
            .as_object()
            .map(|locales| locales.values().filter(|b| b.get(version).is_some()).count())
            .unwrap_or(0);
        if builds < MIN_PRIMARY_BUILDS {
            return Err(Error::ProductDetails(format!(
                "Too few {} primary builds for {}",
                product, key
            )));
        }
    }
    Ok(())
}

/// Refuse data sets that lost most locales of a current version.
pub fn sanity_checks(details: &ProductDetails) -> Result<()> {
    check_primary_builds(
        "firefox",
        json_file(details, "1.0/firefox_versions.json")?,
        json_file(details, "1.0/firefox_primary_builds.json")?,
        &FIREFOX_CHECKED_KEYS,
    )?;
    check_primary_builds(
        "thunderbird",
        json_file(details, "1.0/thunderbird_versions.json")?,
        json_file(details, "1.0/thunderbird_primary_builds.json")?,
        &THUNDERBIRD_CHECKED_KEYS,
    )
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{locales, release};
    use super::*;

    #[test]
    fn test_index_listing() {
        let details: ProductDetails = [
            ("1.0/firefox.json".to_string(), FileContent::Json(json!({}))),
            ("1.0/l10n/Firefox-130.0-build1.json".to_string(), FileContent::Json(json!({}))),
        ]
        .into_iter()
        .collect();
        let listed = create_index_listing(details);

        let FileContent::Html(root) = &listed["index.html"] else {
            panic!("root index is not html");
        };
        assert!(root.contains("<title>Index of /</title>"));
        assert!(root.contains("<li><a href=\"1.0/\">1.0/</a></li>"));
        assert!(!root.contains("Parent Directory"));

        let FileContent::Html(top) = &listed["1.0/index.html"] else {
            panic!("1.0 index is not html");
        };
        assert_eq!(
            top,
            "<!doctype html>\n<html>\n  <head>\n    <title>Index of /1.0</title>\n  </head>\n  <body>\n    <h1>Index of /1.0</h1>\n    <ul>\n      <li><a href=\"/\">Parent Directory</a></li>\n      <li><a href=\"firefox.json\">firefox.json</a></li>\n      <li><a href=\"l10n/\">l10n/</a></li>\n    </ul>\n  </body>\n</html>\n"
        );

        let FileContent::Html(l10n) = &listed["1.0/l10n/index.html"] else {
            panic!("l10n index is not html");
        };
        assert!(l10n.contains("<a href=\"/1.0\">Parent Directory</a>"));
        assert_eq!(listed.len(), 5);
    }

    #[test]
    fn test_l10n_files() {
        let firefox = release("firefox", "130.0", "releases/mozilla-release", (2024, 9, 3));
        let devedition = release("devedition", "131.0b5", "releases/mozilla-beta", (2024, 9, 10));
        let l10n: L10nByRelease = [
            (firefox.name.clone(), locales(2)),
            (devedition.name.clone(), locales(2)),
        ]
        .into_iter()
        .collect();
        let old: OldProductDetails = [
            ("1.0/l10n/Firefox-3.6-build1.json".to_string(), json!({"name": "Firefox-3.6-build1"})),
            ("1.0/firefox.json".to_string(), json!({})),
        ]
        .into_iter()
        .collect();

        let files = get_l10n(&[firefox, devedition], &l10n, &old);
        assert_eq!(
            files.keys().collect::<Vec<_>>(),
            vec!["l10n/Firefox-130.0-build1.json", "l10n/Firefox-3.6-build1.json"]
        );
        let current = &files["l10n/Firefox-130.0-build1.json"];
        assert_eq!(current["locales"]["l01"], json!({"changeset": "rev1"}));
        assert_eq!(current["shippedAt"], json!("2024-09-03T12:30:00+00:00"));
        assert_eq!(current["submittedAt"], json!("2024-09-03T08:00:00+00:00"));
    }

    #[test]
    fn test_regions_and_languages() {
        let old: OldProductDetails = [
            ("1.0/regions/de.json".to_string(), json!({"de": "Deutschland"})),
            ("1.0/languages.json".to_string(), json!({"de": {"English": "German"}})),
        ]
        .into_iter()
        .collect();
        let regions = get_regions(&old);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions["regions/de.json"], json!({"de": "Deutschland"}));
        assert_eq!(get_languages(&old).unwrap()["de"]["English"], json!("German"));

        let err = get_languages(&OldProductDetails::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "\"1.0/languages.json\" does not exist in old product details"
        );
    }

    #[test]
    fn test_sanity_checks() {
        let builds = |count: usize, version: &str| {
            let locales: Map<String, Value> = (0..count)
                .map(|i| (format!("l{}", i), json!({ version: {} })))
                .collect();
            FileContent::Json(Value::Object(locales))
        };
        let mut details: ProductDetails = [
            (
                "1.0/firefox_versions.json".to_string(),
                FileContent::Json(json!({"LATEST_FIREFOX_VERSION": "130.0", "FIREFOX_ESR115": ""})),
            ),
            ("1.0/firefox_primary_builds.json".to_string(), builds(20, "130.0")),
            (
                "1.0/thunderbird_versions.json".to_string(),
                FileContent::Json(json!({"LATEST_THUNDERBIRD_VERSION": "128.0"})),
            ),
            ("1.0/thunderbird_primary_builds.json".to_string(), builds(21, "128.0")),
        ]
        .into_iter()
        .collect();
        assert!(sanity_checks(&details).is_ok());

        details.insert("1.0/firefox_primary_builds.json".to_string(), builds(19, "130.0"));
        let err = sanity_checks(&details).unwrap_err();
        assert_eq!(err.to_string(), "Too few firefox primary builds for LATEST_FIREFOX_VERSION");
    }
}
