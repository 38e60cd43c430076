// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Product table.
//!
//! Every product shipit knows about, with the phases its releases go through,
//! the directory groups allowed to drive them and the repository they are
//! built from. Legacy products are still parsed (old releases reference them)
//! but receive no scopes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::version::VersionScheme;

/// Products releases can be created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Product {
    AndroidComponents,
    AppServices,
    Devedition,
    Fenix,
    Fennec,
    Firefox,
    FirefoxAndroid,
    FocusAndroid,
    MozillaVpnAddons,
    MozillaVpnClient,
    Pinebuild,
    Thunderbird,
}

/// Product details categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductCategory {
    #[serde(rename = "major")]
    Major,
    #[serde(rename = "dev")]
    Development,
    #[serde(rename = "stability")]
    Stability,
    #[serde(rename = "esr")]
    Esr,
}

impl ProductCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Development => "dev",
            Self::Stability => "stability",
            Self::Esr => "esr",
        }
    }
}

/// Static configuration of a product.
#[derive(Debug, Clone, Copy)]
pub struct ProductConfig {
    /// Legacy products receive no scopes and cannot get new releases.
    pub legacy: bool,
    /// Whether automated (Taskcluster) submissions can be switched off per branch.
    pub can_be_disabled: bool,
    /// Directory groups allowed to act on the product.
    pub authorized_groups: &'static [&'static str],
    /// Release promotion phases, in order.
    pub phases: &'static [&'static str],
    /// Repository the product is built from.
    pub repo_url: &'static str,
    /// Version notation used by the product.
    pub version_scheme: VersionScheme,
}

const FIREFOX_GROUPS: &[&str] = &["shipit_relman", "shipit_firefox", "releng"];
const APP_SERVICES_GROUPS: &[&str] = &["shipit_app_services", "releng", "shipit_relman"];
const THUNDERBIRD_GROUPS: &[&str] = &["shipit_thunderbird", "releng"];
const RELENG_GROUPS: &[&str] = &["releng"];

impl Product {
    /// All products, legacy included.
    pub fn all() -> &'static [Product] {
        &[
            Product::AndroidComponents,
            Product::AppServices,
            Product::Devedition,
            Product::Fenix,
            Product::Fennec,
            Product::Firefox,
            Product::FirefoxAndroid,
            Product::FocusAndroid,
            Product::MozillaVpnAddons,
            Product::MozillaVpnClient,
            Product::Pinebuild,
            Product::Thunderbird,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Product::AndroidComponents => "android-components",
            Product::AppServices => "app-services",
            Product::Devedition => "devedition",
            Product::Fenix => "fenix",
            Product::Fennec => "fennec",
            Product::Firefox => "firefox",
            Product::FirefoxAndroid => "firefox-android",
            Product::FocusAndroid => "focus-android",
            Product::MozillaVpnAddons => "mozilla-vpn-addons",
            Product::MozillaVpnClient => "mozilla-vpn-client",
            Product::Pinebuild => "pinebuild",
            Product::Thunderbird => "thunderbird",
        }
    }

    /// Name with the first letter upper-cased, as used in release names.
    pub fn capitalized(&self) -> String {
        capitalize(self.as_str())
    }

    pub fn config(&self) -> ProductConfig {
        match self {
            Product::AndroidComponents => ProductConfig {
                legacy: true,
                can_be_disabled: false,
                authorized_groups: FIREFOX_GROUPS,
                phases: &["promote", "ship"],
                repo_url: "https://github.com/mozilla-mobile/android-components",
                version_scheme: VersionScheme::Mobile,
            },
            Product::AppServices => ProductConfig {
                legacy: false,
                can_be_disabled: false,
                authorized_groups: APP_SERVICES_GROUPS,
                phases: &["promote", "ship"],
                repo_url: "https://github.com/mozilla/application-services",
                version_scheme: VersionScheme::Mobile,
            },
            Product::Devedition => ProductConfig {
                legacy: false,
                can_be_disabled: true,
                authorized_groups: FIREFOX_GROUPS,
                phases: &["promote_devedition", "push_devedition", "ship_devedition"],
                repo_url: "https://hg.mozilla.org/releases/mozilla-beta",
                version_scheme: VersionScheme::Devedition,
            },
            Product::Fenix => ProductConfig {
                legacy: true,
                can_be_disabled: false,
                authorized_groups: FIREFOX_GROUPS,
                phases: &["promote_android", "ship_android"],
                repo_url: "https://github.com/mozilla-mobile/fenix",
                version_scheme: VersionScheme::Mobile,
            },
            Product::Fennec => ProductConfig {
                legacy: true,
                can_be_disabled: false,
                authorized_groups: FIREFOX_GROUPS,
                phases: &["promote_fennec", "ship_fennec"],
                repo_url: "https://hg.mozilla.org/releases/mozilla-esr68",
                version_scheme: VersionScheme::Gecko,
            },
            Product::Firefox => ProductConfig {
                legacy: false,
                can_be_disabled: true,
                authorized_groups: FIREFOX_GROUPS,
                phases: &["promote_firefox", "push_firefox", "ship_firefox"],
                repo_url: "https://hg.mozilla.org/releases/mozilla-release",
                version_scheme: VersionScheme::Gecko,
            },
            Product::FirefoxAndroid => ProductConfig {
                legacy: false,
                can_be_disabled: true,
                authorized_groups: FIREFOX_GROUPS,
                phases: &[
                    "promote_android",
                    "push_android",
                    "ship_android",
                    "promote",
                    "push",
                    "ship",
                ],
                repo_url: "https://github.com/mozilla-mobile/firefox-android",
                version_scheme: VersionScheme::Mobile,
            },
            Product::FocusAndroid => ProductConfig {
                legacy: true,
                can_be_disabled: false,
                authorized_groups: FIREFOX_GROUPS,
                phases: &["promote_android", "ship_android"],
                repo_url: "https://github.com/mozilla-mobile/focus-android",
                version_scheme: VersionScheme::Mobile,
            },
            Product::MozillaVpnAddons => ProductConfig {
                legacy: false,
                can_be_disabled: false,
                authorized_groups: RELENG_GROUPS,
                phases: &["promote-addons", "ship-addons"],
                repo_url: "https://github.com/mozilla-mobile/mozilla-vpn-client",
                version_scheme: VersionScheme::Mobile,
            },
            Product::MozillaVpnClient => ProductConfig {
                legacy: false,
                can_be_disabled: false,
                authorized_groups: RELENG_GROUPS,
                phases: &["promote-client", "ship-client"],
                repo_url: "https://github.com/mozilla-mobile/mozilla-vpn-client",
                version_scheme: VersionScheme::Mobile,
            },
            Product::Pinebuild => ProductConfig {
                legacy: true,
                can_be_disabled: false,
                authorized_groups: FIREFOX_GROUPS,
                phases: &["promote_pinebuild", "ship_pinebuild"],
                repo_url: "https://hg.mozilla.org/releases/mozilla-beta",
                version_scheme: VersionScheme::Gecko,
            },
            Product::Thunderbird => ProductConfig {
                legacy: false,
                can_be_disabled: false,
                authorized_groups: THUNDERBIRD_GROUPS,
                phases: &["promote_thunderbird", "push_thunderbird", "ship_thunderbird"],
                repo_url: "https://hg.mozilla.org/releases/comm-beta",
                version_scheme: VersionScheme::Gecko,
            },
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Product {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Product::all()
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| Error::UnknownProduct(s.to_string()))
    }
}

/// Product names, optionally without legacy products.
pub fn product_names(include_legacy: bool) -> Vec<&'static str> {
    Product::all()
        .iter()
        .filter(|p| include_legacy || !p.config().legacy)
        .map(|p| p.as_str())
        .collect()
}

/// Directory in the source tree holding the product's locales.
pub fn product_to_appname(product: &str) -> Option<&'static str> {
    match product {
        "firefox" | "devedition" | "pinebuild" => Some("browser"),
        "thunderbird" => Some("mail"),
        _ => None,
    }
}

pub(crate) fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}
