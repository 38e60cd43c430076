// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Release rules: naming, release candidates, version bumps and the
//! `release-promotion` action input shared by every phase.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::flavors::supported_flavors;
use crate::product::{Product, capitalize};
use crate::version::{Version, parse_version};

/// Lifecycle status of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStatus {
    Scheduled,
    Shipped,
    Aborted,
}

impl ReleaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseStatus::Scheduled => "scheduled",
            ReleaseStatus::Shipped => "shipped",
            ReleaseStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReleaseStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scheduled" => Ok(ReleaseStatus::Scheduled),
            "shipped" => Ok(ReleaseStatus::Shipped),
            "aborted" => Ok(ReleaseStatus::Aborted),
            other => Err(Error::NotFound(format!("Unknown release status: {}", other))),
        }
    }
}

/// `Firefox-100.0b3-build1`
pub fn release_name(product: &str, version: &str, build_number: i32) -> String {
    format!("{}-{}-build{}", capitalize(product), version, build_number)
}

/// `my-addon-1.2.3-build1`
pub fn xpi_release_name(xpi_name: &str, xpi_version: &str, build_number: i32) -> String {
    format!("{}-{}-build{}", xpi_name, xpi_version, build_number)
}

/// Last path segment of a branch: `releases/mozilla-beta` gives `mozilla-beta`.
pub fn project_from_branch(branch: &str) -> &str {
    branch.rsplit('/').next().unwrap_or(branch)
}

/// Whether phases of this product/project may be scheduled out of order.
pub fn allow_phase_skipping(product: &str, project: &str) -> bool {
    match product {
        "devedition" | "firefox" | "firefox-android" => matches!(project, "try" | "beta"),
        "app-services" => true,
        _ => false,
    }
}

/// Whether a release is a release candidate.
///
/// Only `X.Y` release versions can be RCs. They are when the product has a
/// dedicated RC flavor set, or when one of the partials is a beta (RCs are
/// tested on the beta channel).
pub fn is_rc(product: &str, version: &str, partial_updates: Option<&[String]>) -> Result<bool> {
    let parsed = parse_version(product, version)?;
    if !parsed.is_release() || parsed.patch_number().is_some() {
        return Ok(false);
    }

    if supported_flavors(&format!("{}_rc", product)).is_some() {
        return Ok(true);
    }

    for partial in partial_updates.unwrap_or_default() {
        if parse_version(product, partial)?.is_beta() {
            return Ok(true);
        }
    }

    Ok(false)
}

/// The version the next release will carry.
pub fn bump_version(product: &str, version: &str) -> Result<String> {
    let parsed = parse_version(product, version)?;
    let field = parsed.natural_bump_field();
    debug!(?field, version, "Bumping version");
    let bumped = parsed.bump(field)?.to_string();
    info!(version, bumped = %bumped, "Version bumped");
    Ok(bumped)
}

/// Partner repacks ship for Firefox betas from b5, releases and ESRs.
pub fn is_partner_enabled(product: &str, version: &str, min_version: u32) -> Result<bool> {
    if product != Product::Firefox.as_str() {
        return Ok(false);
    }
    let v = Version::parse_gecko(version)?;
    Ok(v.major_number() >= min_version
        && (v.beta_number().is_some_and(|b| b >= 5) || v.is_release() || v.is_esr()))
}

/// EME-free builds ship for Firefox betas from b8 and releases.
pub fn is_eme_free_enabled(product: &str, version: &str) -> Result<bool> {
    if product != Product::Firefox.as_str() {
        return Ok(false);
    }
    let v = Version::parse_gecko(version)?;
    Ok(v.beta_number().is_some_and(|b| b >= 8) || v.is_release())
}

/// Leading integer of a version string.
pub fn major_of(version: &str) -> Option<u32> {
    version.split('.').next()?.parse().ok()
}

/// Release fields that feed the `release-promotion` action input.
#[derive(Debug, Clone)]
pub struct ActionInputSource<'a> {
    pub product: &'a str,
    pub version: &'a str,
    pub build_number: i32,
    pub release_eta: Option<&'a str>,
    pub partial_updates: Option<&'a Value>,
}

/// Input shared by every phase of a product release.
pub fn common_action_input(source: &ActionInputSource<'_>) -> Result<Map<String, Value>> {
    let next_version = bump_version(source.product, source.version)?;
    let mut input = Map::new();
    input.insert("build_number".into(), json!(source.build_number));
    input.insert("next_version".into(), json!(next_version));
    input.insert("version".into(), json!(source.version));
    input.insert("release_eta".into(), json!(source.release_eta));
    input.insert(
        "release_enable_emefree".into(),
        json!(is_eme_free_enabled(source.product, source.version)?),
    );

    let partners_enabled = is_partner_enabled(source.product, source.version, 60)?;
    if major_of(source.version).is_some_and(|major| major >= 81) {
        input.insert("release_enable_partner_repack".into(), json!(partners_enabled));
        input.insert("release_enable_partner_attribution".into(), json!(partners_enabled));
    } else {
        input.insert("release_enable_partners".into(), json!(partners_enabled));
    }

    if let Some(partials) = source.partial_updates
        && !is_empty_json(partials)
    {
        input.insert("partial_updates".into(), partials.clone());
    }
    Ok(input)
}

/// Input shared by every phase of an XPI release.
pub fn xpi_action_input(
    build_number: i32,
    xpi_name: &str,
    xpi_revision: &str,
    xpi_version: &str,
) -> Map<String, Value> {
    let mut input = Map::new();
    input.insert("build_number".into(), json!(build_number));
    input.insert("xpi_name".into(), json!(xpi_name));
    input.insert("revision".into(), json!(xpi_revision));
    input.insert("version".into(), json!(xpi_version));
    input
}

fn is_empty_json(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partials(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_release_name() {
        assert_eq!(release_name("firefox", "100.0b3", 1), "Firefox-100.0b3-build1");
        assert_eq!(release_name("thunderbird", "102.1.0esr", 2), "Thunderbird-102.1.0esr-build2");
        assert_eq!(xpi_release_name("my-addon", "1.2.3", 4), "my-addon-1.2.3-build4");
    }

    #[test]
    fn test_project_from_branch() {
        assert_eq!(project_from_branch("releases/mozilla-beta"), "mozilla-beta");
        assert_eq!(project_from_branch("try"), "try");
        assert_eq!(project_from_branch(""), "");
    }

    #[test]
    fn test_is_rc() {
        let cases: &[(&str, &str, Option<Vec<String>>, bool)] = &[
            ("firefox", "64.0", None, true),
            ("thunderbird", "64.0", None, false),
            ("fennec", "64.0", None, false),
            ("firefox", "64.0.1", None, false),
            ("thunderbird", "64.0.1", None, false),
            ("firefox", "56.0b3", None, false),
            ("firefox", "45.0esr", None, false),
            ("firefox", "57.0", Some(partials(&["56.0b1", "55.0"])), true),
            ("firefox", "57.0", Some(partials(&["56.0", "55.0"])), true),
            ("firefox", "57.0.1", Some(partials(&["57.0", "56.0.1", "56.0"])), false),
            ("thunderbird", "57.0", Some(partials(&["56.0", "55.0"])), false),
            ("thunderbird", "57.0", Some(partials(&["56.0", "56.0b4", "55.0"])), true),
            ("firefox", "70.0b4", Some(partials(&["69.0b15", "69.0b16", "70.0b3"])), false),
            ("devedition", "70.0b4", Some(partials(&["70.0b3", "70.0b1", "70.0b2"])), false),
        ];
        for (product, version, partial_updates, expected) in cases {
            assert_eq!(
                is_rc(product, version, partial_updates.as_deref()).unwrap(),
                *expected,
                "{} {}",
                product,
                version
            );
        }
    }

    #[test]
    fn test_bump_version() {
        let cases = [
            ("firefox", "45.0", "45.0.1"),
            ("firefox", "45.0.1", "45.0.2"),
            ("firefox", "45.0b3", "45.0b4"),
            ("firefox", "45.0esr", "45.0.1esr"),
            ("firefox", "45.0.1esr", "45.0.2esr"),
            ("firefox", "45.2.1esr", "45.2.2esr"),
            ("fennec", "68.1b2", "68.1b3"),
            ("fenix", "84.0.0-beta.2", "84.0.0-beta.3"),
            ("fenix", "84.0.0", "84.0.1"),
        ];
        for (product, version, expected) in cases {
            assert_eq!(bump_version(product, version).unwrap(), expected);
        }
    }

    #[test]
    fn test_is_partner_enabled() {
        let cases = [
            ("firefox", "59.0", false),
            ("firefox", "65.0b3", false),
            ("firefox", "65.0b8", true),
            ("firefox", "65.0", true),
            ("firefox", "65.0.1", true),
            ("firefox", "60.5.0esr", true),
            ("fennec", "65.0b8", false),
            ("fennec", "65.0", false),
        ];
        for (product, version, expected) in cases {
            assert_eq!(is_partner_enabled(product, version, 60).unwrap(), expected, "{}", version);
        }
    }

    #[test]
    fn test_is_eme_free_enabled() {
        let cases = [
            ("firefox", "65.0b3", false),
            ("firefox", "65.0b8", true),
            ("firefox", "65.0", true),
            ("firefox", "65.0.1", true),
            ("firefox", "60.5.0esr", false),
            ("fennec", "65.0b8", false),
        ];
        for (product, version, expected) in cases {
            assert_eq!(is_eme_free_enabled(product, version).unwrap(), expected, "{}", version);
        }
    }

    #[test]
    fn test_allow_phase_skipping() {
        assert!(allow_phase_skipping("firefox", "try"));
        assert!(allow_phase_skipping("devedition", "beta"));
        assert!(!allow_phase_skipping("firefox", "mozilla-release"));
        assert!(allow_phase_skipping("app-services", "anything"));
        assert!(!allow_phase_skipping("thunderbird", "try"));
    }

    #[test]
    fn test_common_action_input_partner_keys() {
        let source = ActionInputSource {
            product: "firefox",
            version: "100.0b5",
            build_number: 1,
            release_eta: None,
            partial_updates: None,
        };
        let input = common_action_input(&source).unwrap();
        assert_eq!(input["next_version"], "100.0b6");
        assert_eq!(input["release_enable_partner_repack"], true);
        assert_eq!(input["release_enable_partner_attribution"], true);
        assert!(!input.contains_key("release_enable_partners"));
        assert!(!input.contains_key("partial_updates"));

        let source = ActionInputSource {
            product: "firefox",
            version: "80.0",
            build_number: 2,
            release_eta: Some("2020-08-25T13:00:00Z"),
            partial_updates: Some(&json!({"79.0": {"buildNumber": 1, "locales": ["de"]}})),
        };
        let input = common_action_input(&source).unwrap();
        assert_eq!(input["release_enable_partners"], true);
        assert_eq!(input["release_eta"], "2020-08-25T13:00:00Z");
        assert_eq!(input["partial_updates"]["79.0"]["buildNumber"], 1);
    }
}
