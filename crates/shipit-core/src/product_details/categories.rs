// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
use regex::Regex;
use std::sync::LazyLock;

use super::DetailsConfig;
use crate::product::ProductCategory;

// Dot releases that were shipped as majors.
static FIREFOX_MAJOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+\.[0-9]+(esr|)|14\.0\.1|125\.0\.1)$").expect("firefox major regex")
});

static THUNDERBIRD_MAJOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+\.[0-9]+(esr|)|14\.0\.1|38\.0\.1)$").expect("thunderbird major regex")
});

static STABILITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+\.[0-9]+\.[0-9]+(esr|)|[0-9]+\.[0-9]+\.[0-9]+\.[0-9]+(esr|))$")
        .expect("stability regex")
});

// 38.0.5b2 was a development release too.
static DEVELOPMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+\.[0-9]|[0-9]+\.[0-9]+\.[0-9])(b|rc|build|plugin)[0-9]+$")
        .expect("development regex")
});

/// Categories a release version belongs to, in the order they apply.
///
/// The last category wins when a single category is needed: ESR releases
/// are both stability (or major) and ESR.
pub fn get_product_categories(
    product: &str,
    version: &str,
    config: &DetailsConfig,
) -> Vec<ProductCategory> {
    let major_re = if product == "thunderbird" {
        &*THUNDERBIRD_MAJOR_RE
    } else {
        &*FIREFOX_MAJOR_RE
    };
    let esr_major = config
        .esr_next
        .as_deref()
        .filter(|next| !next.is_empty())
        .unwrap_or(&config.current_esr);

    let mut categories = Vec::new();
    if major_re.is_match(version) {
        categories.push(ProductCategory::Major);
    }
    if STABILITY_RE.is_match(version) {
        categories.push(ProductCategory::Stability);
    }
    if DEVELOPMENT_RE.is_match(version) {
        categories.push(ProductCategory::Development);
    }
    if is_esr_of(version, esr_major) {
        categories.push(ProductCategory::Esr);
    }
    categories
}

/// `<major>.N[.N]esr`
fn is_esr_of(version: &str, esr_major: &str) -> bool {
    let Some(rest) = version
        .strip_prefix(esr_major)
        .and_then(|rest| rest.strip_suffix("esr"))
    else {
        return false;
    };
    let parts: Vec<&str> = rest.split('.').collect();
    // leading empty part from the dot after the major
    parts.len() >= 2
        && parts.len() <= 3
        && parts[0].is_empty()
        && parts[1..]
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProductCategory::*;

    fn categories(product: &str, version: &str) -> Vec<ProductCategory> {
        get_product_categories(product, version, &DetailsConfig::default())
    }

    #[test]
    fn test_firefox_categories() {
        assert_eq!(categories("firefox", "130.0"), vec![Major]);
        assert_eq!(categories("firefox", "130.0.1"), vec![Stability]);
        assert_eq!(categories("firefox", "125.0.1"), vec![Major, Stability]);
        assert_eq!(categories("firefox", "131.0b5"), vec![Development]);
        assert_eq!(categories("firefox", "38.0.5b2"), vec![Development]);
        assert_eq!(categories("firefox", "128.2.0esr"), vec![Stability]);
        assert_eq!(categories("firefox", "140.2.0esr"), vec![Stability, Esr]);
        assert_eq!(categories("firefox", "140.0esr"), vec![Major, Esr]);
        assert!(categories("firefox", "132.0a1").is_empty());
    }

    #[test]
    fn test_thunderbird_special_majors() {
        assert_eq!(categories("thunderbird", "38.0.1"), vec![Major, Stability]);
        assert_eq!(categories("thunderbird", "125.0.1"), vec![Stability]);
    }

    #[test]
    fn test_esr_next_takes_over() {
        let config = DetailsConfig {
            esr_next: Some("153".to_string()),
            ..DetailsConfig::default()
        };
        assert_eq!(
            get_product_categories("firefox", "153.1.0esr", &config),
            vec![Stability, Esr]
        );
        assert_eq!(
            get_product_categories("firefox", "140.1.0esr", &config),
            vec![Stability]
        );
    }
}
