// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scopes and the directory groups holding them.
//!
//! Every action is guarded by a scope string such as
//! `project:releng:services/shipit_api/schedule_phase/firefox/ship_firefox`.
//! OIDC users hold the scopes mapped to their groups; Taskcluster clients
//! hold the scopes Taskcluster grants them, with trailing-`*` wildcards.

use std::collections::{BTreeMap, BTreeSet};

use crate::flavors::supported_flavors;
use crate::product::Product;

pub const SCOPE_PREFIX: &str = "project:releng:services/shipit_api";

/// Group that holds every scope.
pub const ADMIN_GROUP: &str = "releng";

/// Prefix an action path: `add_release/firefox` becomes a full scope.
pub fn scope(action: &str) -> String {
    format!("{}/{}", SCOPE_PREFIX, action)
}

/// Action paths for a non-legacy product.
pub fn product_scopes(product: Product) -> Vec<String> {
    let name = product.as_str();
    let config = product.config();
    let mut scopes = vec![
        format!("add_release/{}", name),
        format!("abandon_release/{}", name),
        format!("add_merge_automation/{}", name),
        format!("cancel_merge_automation/{}", name),
    ];

    let mut phases: Vec<String> = supported_flavors(name)
        .unwrap_or_default()
        .into_iter()
        .map(|f| f.name)
        .collect();
    if product == Product::Firefox {
        phases.extend(
            supported_flavors("firefox_rc")
                .unwrap_or_default()
                .into_iter()
                .map(|f| f.name),
        );
    }
    for phase in phases {
        scopes.push(format!("schedule_phase/{}/{}", name, phase));
        scopes.push(format!("phase_signoff/{}/{}", name, phase));
    }

    if config.can_be_disabled {
        scopes.push(format!("disable_product/{}", name));
        scopes.push(format!("enable_product/{}", name));
    }

    if config.repo_url.contains("github.com") {
        scopes.push("github".to_string());
    }

    scopes
}

struct XpiTypeGroups {
    xpi_type: &'static str,
    /// Groups allowed to create, abandon and build.
    build: &'static [&'static str],
    /// Groups allowed to promote and ship.
    ship: &'static [&'static str],
}

const XPI_TYPES: &[XpiTypeGroups] = &[
    XpiTypeGroups {
        xpi_type: "privileged",
        build: &["xpi_privileged_build", "xpi_privileged_admin", "releng"],
        ship: &["xpi_privileged_admin", "releng"],
    },
    XpiTypeGroups {
        xpi_type: "system",
        build: &["xpi_system_build", "xpi_system_admin", "releng"],
        ship: &["xpi_system_admin", "releng"],
    },
    XpiTypeGroups {
        xpi_type: "mozillaonline-privileged",
        build: &["xpi_mozillaonline_build", "xpi_mozillaonline_admin", "releng"],
        ship: &["xpi_mozillaonline_build", "xpi_mozillaonline_admin", "releng"],
    },
    XpiTypeGroups {
        xpi_type: "normandy-privileged",
        build: &["releng"],
        ship: &["releng"],
    },
];

/// Scope prefix for XPI types: `system_newtab` is governed by `system`.
pub fn xpi_scope_type(xpi_type: &str) -> &str {
    if xpi_type.starts_with("system_") {
        "system"
    } else {
        xpi_type
    }
}

/// Full scope → groups table.
///
/// Built from every non-legacy product plus the XPI types; definitions of
/// the same scope by several products merge by union.
pub fn groups_per_scope() -> BTreeMap<String, BTreeSet<String>> {
    let mut table: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut grant = |action: String, groups: &[&str]| {
        table
            .entry(scope(&action))
            .or_default()
            .extend(groups.iter().map(|g| g.to_string()));
    };

    for product in Product::all() {
        let config = product.config();
        if config.legacy {
            continue;
        }
        for action in product_scopes(*product) {
            grant(action, config.authorized_groups);
        }
    }

    for xpi in XPI_TYPES {
        grant(format!("add_release/xpi/{}", xpi.xpi_type), xpi.build);
        grant(format!("abandon_release/xpi/{}", xpi.xpi_type), xpi.build);
        for phase in ["build", "promote", "ship"] {
            let groups = if phase == "build" { xpi.build } else { xpi.ship };
            grant(format!("schedule_phase/xpi/{}/{}", xpi.xpi_type, phase), groups);
            grant(format!("phase_signoff/xpi/{}/{}", xpi.xpi_type, phase), groups);
        }
        grant("github".to_string(), xpi.build);
    }

    grant("rebuild_product_details".to_string(), &["shipit_firefox", "releng"]);
    grant("update_release_status".to_string(), &[ADMIN_GROUP]);

    table
}

/// Scopes held by a member of the given groups.
pub fn scopes_for_groups<S: AsRef<str>>(groups: &[S], admin_group: &str) -> BTreeSet<String> {
    let groups: BTreeSet<&str> = groups.iter().map(|g| g.as_ref()).collect();
    let is_admin = groups.contains(admin_group);
    groups_per_scope()
        .into_iter()
        .filter(|(_, allowed)| is_admin || allowed.iter().any(|g| groups.contains(g.as_str())))
        .map(|(scope, _)| scope)
        .collect()
}

/// Taskcluster scope satisfaction: a trailing `*` matches any suffix.
pub fn scope_match(owned: &[String], required: &str) -> bool {
    owned.iter().any(|scope| match scope.strip_suffix('*') {
        Some(prefix) => required.starts_with(prefix),
        None => scope == required,
    })
}

/// Default groups allowed to sign each signoff permission key.
pub fn default_signoff_groups() -> BTreeMap<String, Vec<String>> {
    let mut table: BTreeMap<String, Vec<String>> = [
        ("admin", vec!["releng"]),
        ("vpn-signoff", vec!["vpn_signoff"]),
        ("xpi_privileged_signoff", vec!["xpi_privileged_build"]),
        ("xpi_privileged_admin_signoff", vec!["xpi_privileged_admin"]),
        ("xpi_mozillaonline-privileged_signoff", vec!["xpi_mozillaonline_build"]),
        ("xpi_mozillaonline-privileged_admin_signoff", vec!["xpi_mozillaonline_admin"]),
        ("xpi_normandy-privileged_signoff", vec!["releng"]),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.into_iter().map(String::from).collect()))
    .collect();

    for addon in crate::flavors::SYSTEM_ADDONS {
        table.insert(
            format!("system_addon_{}", addon),
            vec!["xpi_system_build".to_string(), "xpi_system_admin".to_string()],
        );
    }
    table
}
