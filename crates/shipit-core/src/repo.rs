// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Source-control helpers: GitHub URLs, trust domains, allowed files.

use regex::Regex;

use crate::error::{Error, Result};

/// Mobile repositories hosted outside the `mozilla-mobile` organization.
pub const SUPPORTED_MOBILE_REPO_NAMES: &[&str] = &["firefox-android", "staging-firefox-android"];

/// Repositories built in the `mozillavpn` trust domain.
pub const MOZILLAVPN_REPO_NAMES: &[&str] = &["mozilla-vpn-client", "staging-mozilla-vpn-client"];

pub fn is_github_url(url: &str) -> bool {
    url.starts_with("https://github.com/") || url.starts_with("ssh://github.com/")
}

/// Owner and repository name of a GitHub URL (`https://` or `git@` form).
pub fn extract_github_repo_owner_and_name(url: &str) -> Result<(String, String)> {
    let path = if url.contains('@') && !url.contains("://") {
        url.rsplit(':').next().unwrap_or_default().to_string()
    } else {
        let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
        without_scheme
            .split_once('/')
            .map(|(_, path)| path.to_string())
            .unwrap_or_default()
    };
    let mut parts = path.trim_start_matches('/').split('/');
    let owner = parts.next().filter(|s| !s.is_empty());
    let name = parts.next().filter(|s| !s.is_empty());
    match (owner, name) {
        (Some(owner), Some(name)) => Ok((
            owner.to_string(),
            name.strip_suffix(".git").unwrap_or(name).to_string(),
        )),
        _ => Err(Error::NotFound(format!("Cannot extract owner and repository from {}", url))),
    }
}

/// Taskcluster trust domain of a repository.
pub fn get_trust_domain(repo_url: &str, project: &str) -> Result<&'static str> {
    if is_github_url(repo_url) {
        let (owner, name) = extract_github_repo_owner_and_name(repo_url)?;
        if MOZILLAVPN_REPO_NAMES.contains(&name.as_str()) {
            return Ok("mozillavpn");
        }
        if owner == "mozilla-mobile" || SUPPORTED_MOBILE_REPO_NAMES.contains(&name.as_str()) {
            return Ok("mobile");
        }
        return Err(Error::UnsupportedFlavor(format!(
            "Unable to know what to do with repo_owner \"{}\" and repo_name \"{}\"",
            owner, name
        )));
    }
    if project.contains("comm") {
        Ok("comm")
    } else if project.contains("xpi") {
        Ok("xpi")
    } else {
        Ok("gecko")
    }
}

/// Index route of the decision task of a revision.
pub fn decision_task_route(repo_url: &str, project: &str, revision: &str) -> Result<String> {
    let trust_domain = get_trust_domain(repo_url, project)?;
    let project = if trust_domain == "mobile" || trust_domain == "mozillavpn" {
        extract_github_repo_owner_and_name(repo_url)?.1
    } else {
        project.to_string()
    };
    Ok(format!(
        "{}.v2.{}.revision.{}.taskgraph.decision",
        trust_domain, project, revision
    ))
}

/// Files that may be fetched from a GitHub repository.
pub fn allowed_github_files(owner: &str, repo: &str) -> Vec<Regex> {
    let mut patterns = vec![r"taskcluster/config\.yml", r"version\.txt"];
    match (owner, repo) {
        ("mozilla-firefox", "firefox") | ("mozilla-releng", "staging-firefox") => {
            patterns.push(r"browser/extensions/[^/]+(?:/extension)?/manifest\.json")
        }
        ("mozilla-extensions", _) => patterns.push(r"package\.json"),
        ("mozilla-releng", "staging-xpi-public") => patterns.push(r"one/package\.json"),
        _ => {}
    }
    patterns
        .into_iter()
        .filter_map(|p| Regex::new(&format!("^(?:{})$", p)).ok())
        .collect()
}

pub fn is_allowed_github_file(owner: &str, repo: &str, path: &str) -> bool {
    allowed_github_files(owner, repo)
        .iter()
        .any(|re| re.is_match(path))
}

/// The only item matching `predicate`.
pub fn get_single_item_from_sequence<T, F>(items: Vec<T>, predicate: F) -> Result<T>
where
    F: Fn(&T) -> bool,
{
    let mut matching: Vec<T> = items.into_iter().filter(|item| predicate(item)).collect();
    match matching.len() {
        0 => Err(Error::NotFound("No item matched condition".to_string())),
        1 => Ok(matching.remove(0)),
        n => Err(Error::Ambiguous(format!("Too many items matched condition: {}", n))),
    }
}
