// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Release promotion flavors and the signoffs each phase requires.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

use crate::error::{Error, Result};
use crate::product::{Product, capitalize};
use crate::release::is_rc;

/// A phase definition for a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flavor {
    pub name: String,
    /// Whether the phase's task group feeds `previous_graph_ids` of later phases.
    pub in_previous_graph_ids: bool,
}

impl Flavor {
    pub fn new(name: &str, in_previous_graph_ids: bool) -> Self {
        Self {
            name: name.to_string(),
            in_previous_graph_ids,
        }
    }
}

/// System add-ons shipped through the XPI pipeline.
pub const SYSTEM_ADDONS: &[&str] = &["data-leak-blocker", "newtab", "webcompat"];

/// Flavors shipit knows for a product key.
///
/// `firefox_rc` is not a product: it is the flavor set used for Firefox
/// release candidates.
pub fn supported_flavors(product_key: &str) -> Option<Vec<Flavor>> {
    if product_key == "firefox_rc" {
        return Some(vec![
            Flavor::new("promote_firefox_rc", true),
            Flavor::new("ship_firefox_rc", false),
            Flavor::new("push_firefox", true),
            Flavor::new("ship_firefox", true),
        ]);
    }
    let product: Product = product_key.parse().ok()?;
    Some(
        product
            .config()
            .phases
            .iter()
            .map(|phase| Flavor::new(phase, true))
            .collect(),
    )
}

/// Select the flavors of a release among the ones advertised by the decision task.
///
/// Mismatches between the two lists are logged; only flavors present in both
/// are returned, in shipit's order.
pub fn extract_our_flavors(
    available: &[String],
    product: &str,
    version: &str,
    partial_updates: Option<&[String]>,
    product_key: Option<&str>,
) -> Result<Vec<Flavor>> {
    let mut key = product_key.unwrap_or(product).to_string();
    if is_rc(&key, version, partial_updates)? {
        key = format!("{}_rc", key);
    }

    let flavors = supported_flavors(&key)
        .ok_or_else(|| Error::UnsupportedFlavor(format!("`{}` is not supported", key)))?;

    let hardcoded: BTreeSet<&str> = flavors.iter().map(|f| f.name.as_str()).collect();
    let advertised: BTreeSet<&str> = available.iter().map(|f| f.as_str()).collect();

    let missing: Vec<&str> = hardcoded.difference(&advertised).copied().collect();
    if !missing.is_empty() {
        warn!(
            "Some hardcoded flavors are not in actions.json: {:?}. Product: {}. Version: {}",
            missing, product, version
        );
    }
    let extra: Vec<&str> = advertised.difference(&hardcoded).copied().collect();
    if !extra.is_empty() {
        warn!(
            "Some flavors in actions.json are not hardcoded in shipit: {:?}. Product: {}. Version: {}",
            extra, product, version
        );
    }

    Ok(flavors
        .into_iter()
        .filter(|f| advertised.contains(f.name.as_str()))
        .collect())
}

/// A signoff a phase requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignoffRequirement {
    pub name: String,
    pub description: String,
    /// Key of the group table allowed to sign.
    pub permissions: String,
}

fn requirement(name: &str, description: &str, permissions: &str) -> SignoffRequirement {
    SignoffRequirement {
        name: name.to_string(),
        description: description.to_string(),
        permissions: permissions.to_string(),
    }
}

/// Signoffs required by a product release phase.
pub fn product_signoffs(product: &str, phase: &str) -> Vec<SignoffRequirement> {
    match (product, phase) {
        ("mozilla-vpn-client", "ship-client") | ("mozilla-vpn-addons", "ship-addons") => vec![
            requirement("MozillaVPN Team", "Ship mozilla-vpn-client", "vpn-signoff"),
            requirement("Release Engineering", "Ship mozilla-vpn-client", "admin"),
        ],
        _ => Vec::new(),
    }
}

/// Signoffs required by an XPI release phase.
pub fn xpi_signoffs(xpi_type: &str, phase: &str) -> Vec<SignoffRequirement> {
    if let Some(addon) = xpi_type.strip_prefix("system_") {
        if phase == "ship" && SYSTEM_ADDONS.contains(&addon) {
            let permissions = format!("system_addon_{}", addon);
            let description = format!("Ship {}", addon);
            return (1..=2)
                .map(|n| {
                    requirement(
                        &format!("{} developer (#{})", capitalize(addon), n),
                        &description,
                        &permissions,
                    )
                })
                .collect();
        }
        return Vec::new();
    }

    match (xpi_type, phase) {
        ("privileged", "promote") => vec![
            requirement("Add-on Review Team", "Promote XPI", "xpi_privileged_admin_signoff"),
            requirement(
                "Privileged webextension admin",
                "Promote XPI",
                "xpi_privileged_signoff",
            ),
        ],
        ("privileged", "ship") => vec![requirement(
            "Privileged webextension admin",
            "Ship XPI",
            "xpi_privileged_signoff",
        )],
        ("mozillaonline-privileged", "promote" | "ship") => {
            let description = if phase == "promote" {
                "Promote XPI"
            } else {
                "Ship XPI"
            };
            vec![
                requirement(
                    "MozillaOnline privileged webextension team",
                    description,
                    "xpi_mozillaonline-privileged_signoff",
                ),
                requirement(
                    "MozillaOnline privileged webextension admin",
                    description,
                    "xpi_mozillaonline-privileged_admin_signoff",
                ),
            ]
        }
        ("normandy-privileged", "promote" | "ship") => vec![requirement(
            "Normandy privileged admin",
            if phase == "promote" {
                "Promote XPI"
            } else {
                "Ship XPI"
            },
            "xpi_normandy-privileged_signoff",
        )],
        _ => Vec::new(),
    }
}
