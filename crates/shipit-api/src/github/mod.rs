// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! GitHub access through the GraphQL API.
//!
//! Used by the release UI to browse branches and commits, and by XPI
//! releases to read the add-on manifests of the XPI manifest repository.

mod graphql;
mod mock;

pub use graphql::GraphQlClient;
pub use mock::MockGitHub;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use shipit_core::repo::{extract_github_repo_owner_and_name, is_allowed_github_file};

/// GitHub errors.
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GITHUB_TOKEN is not defined and required in order to query github.com")]
    MissingToken,

    /// The API answered with GraphQL `errors`.
    #[error("Github query error - {0}")]
    Query(String),

    #[error("Retrieving {path} not allowed for {owner}/{repo}!")]
    NotAllowed {
        owner: String,
        repo: String,
        path: String,
    },

    /// An object the query expected is missing.
    #[error("{0}")]
    NotFound(String),

    /// The manifest repository does not describe the add-on as expected.
    #[error("{0}")]
    InvalidManifest(String),

    #[error("GitHub request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl GitHubError {
    pub fn status(&self) -> StatusCode {
        match self {
            GitHubError::MissingToken => StatusCode::INTERNAL_SERVER_ERROR,
            GitHubError::Query(_) | GitHubError::Request(_) => StatusCode::BAD_GATEWAY,
            GitHubError::NotAllowed { .. } | GitHubError::InvalidManifest(_) => {
                StatusCode::BAD_REQUEST
            }
            GitHubError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

pub type GitHubResult<T> = std::result::Result<T, GitHubError>;

/// A branch and the date of its head commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub committer_date: String,
}

/// A commit of a branch's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// `name <email>`
    pub author: String,
    pub committer_date: String,
    /// First line of the commit message.
    pub message: String,
    pub revision: String,
}

/// An active add-on of the XPI manifest repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpiEntry {
    /// Commit of the add-on repository the manifest points at.
    pub revision: String,
    pub branch: String,
    pub xpi_name: String,
    pub owner: String,
    pub repo: String,
    /// Revision of the manifest repository.
    pub manifest_revision: String,
    pub directory: String,
    #[serde(rename = "addon-type")]
    pub addon_type: String,
    pub install_type: String,
}

/// GitHub operations used by shipit.
#[async_trait]
pub trait GitHub: Send + Sync {
    /// Text of a file; `path` must be one of the allowed files of the
    /// repository.
    async fn get_file(&self, owner: &str, repo: &str, git_ref: &str, path: &str)
    -> GitHubResult<String>;

    /// YAML manifests of a directory, keyed by file stem. Each manifest
    /// gets a `name` key holding its stem.
    async fn get_files(
        &self,
        owner: &str,
        repo: &str,
        directory: &str,
        git_ref: &str,
    ) -> GitHubResult<BTreeMap<String, Value>>;

    /// Commit a ref points at.
    async fn ref_to_commit(&self, owner: &str, repo: &str, git_ref: &str) -> GitHubResult<String>;

    async fn list_branches(&self, owner: &str, repo: &str) -> GitHubResult<Vec<Branch>>;

    /// Latest commits of a branch, newest first.
    async fn list_commits(&self, owner: &str, repo: &str, branch: &str)
    -> GitHubResult<Vec<Commit>>;
}

/// Reject paths outside the repository's allowed files.
pub(crate) fn ensure_allowed(owner: &str, repo: &str, path: &str) -> GitHubResult<()> {
    if is_allowed_github_file(owner, repo, path) {
        Ok(())
    } else {
        Err(GitHubError::NotAllowed {
            owner: owner.to_string(),
            repo: repo.to_string(),
            path: path.to_string(),
        })
    }
}

fn manifest_str<'a>(manifest: &'a Value, key: &str) -> Option<&'a str> {
    manifest.get(key).and_then(Value::as_str)
}

/// Active add-ons of an XPI manifest repository at `revision`.
///
/// Each add-on's repository comes from the taskgraph configuration entry
/// named by its `repo-prefix`; its branch (or the repository's default ref)
/// is resolved to a commit.
pub async fn list_xpis(
    github: &dyn GitHub,
    owner: &str,
    repo: &str,
    revision: &str,
    skip_private: bool,
) -> GitHubResult<Vec<XpiEntry>> {
    let manifests = github.get_files(owner, repo, "manifests", revision).await?;
    let config_text = github
        .get_file(owner, repo, revision, "taskcluster/config.yml")
        .await?;
    let config: Value = serde_yaml::from_str(&config_text)
        .map_err(|e| GitHubError::InvalidManifest(format!("Invalid taskgraph config: {}", e)))?;

    let mut xpis = Vec::new();
    for manifest in manifests.values() {
        if !manifest.get("active").and_then(Value::as_bool).unwrap_or(false) {
            continue;
        }
        if skip_private
            && manifest
                .get("private-repo")
                .and_then(Value::as_bool)
                .unwrap_or(false)
        {
            continue;
        }

        let name = manifest_str(manifest, "name").unwrap_or_default();
        let prefix = manifest_str(manifest, "repo-prefix").ok_or_else(|| {
            GitHubError::InvalidManifest(format!("{} has no repo-prefix", name))
        })?;
        let repository = config
            .pointer(&format!("/taskgraph/repositories/{}", prefix))
            .ok_or_else(|| {
                GitHubError::InvalidManifest(format!("Unknown repository prefix {}", prefix))
            })?;
        let repo_url = manifest_str(repository, "default-repository").ok_or_else(|| {
            GitHubError::InvalidManifest(format!("{} has no default-repository", prefix))
        })?;
        let (xpi_owner, xpi_repo) = extract_github_repo_owner_and_name(repo_url)
            .map_err(|e| GitHubError::InvalidManifest(e.to_string()))?;

        let git_ref = manifest_str(manifest, "branch")
            .or_else(|| manifest_str(repository, "default-ref"))
            .unwrap_or("master");
        let commit = github.ref_to_commit(&xpi_owner, &xpi_repo, git_ref).await?;

        xpis.push(XpiEntry {
            revision: commit,
            branch: manifest_str(manifest, "branch").unwrap_or("master").to_string(),
            xpi_name: name.to_string(),
            owner: xpi_owner,
            repo: xpi_repo,
            manifest_revision: revision.to_string(),
            directory: manifest_str(manifest, "directory").unwrap_or_default().to_string(),
            addon_type: manifest_str(manifest, "addon-type").unwrap_or_default().to_string(),
            install_type: manifest_str(manifest, "install-type")
                .unwrap_or("yarn")
                .to_string(),
        });
    }
    Ok(xpis)
}

/// Manifest type of an add-on; system add-ons become `system_<name>`.
pub async fn get_xpi_type(
    github: &dyn GitHub,
    owner: &str,
    repo: &str,
    revision: &str,
    xpi_name: &str,
    skip_private: bool,
) -> GitHubResult<String> {
    let mut matching: Vec<XpiEntry> = list_xpis(github, owner, repo, revision, skip_private)
        .await?
        .into_iter()
        .filter(|xpi| xpi.xpi_name == xpi_name)
        .collect();

    let xpi = match matching.len() {
        1 => matching.remove(0),
        0 => {
            return Err(GitHubError::InvalidManifest(format!(
                "No active add-on named {} in {}/{}",
                xpi_name, owner, repo
            )));
        }
        _ => {
            return Err(GitHubError::InvalidManifest(format!(
                "Too many add-ons named {} in {}/{}",
                xpi_name, owner, repo
            )));
        }
    };

    if xpi.addon_type == "system" {
        Ok(format!("system_{}", xpi.xpi_name))
    } else {
        Ok(xpi.addon_type)
    }
}
