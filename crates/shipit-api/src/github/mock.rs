// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock GitHub for testing.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use super::{Branch, Commit, GitHub, GitHubError, GitHubResult, ensure_allowed};

type RepoKey = (String, String);

#[derive(Debug, Default)]
struct MockState {
    files: HashMap<(String, String, String, String), String>,
    manifests: HashMap<(String, String, String, String), BTreeMap<String, Value>>,
    refs: HashMap<(String, String, String), String>,
    branches: HashMap<RepoKey, Vec<Branch>>,
    commits: HashMap<(String, String, String), Vec<Commit>>,
}

/// In-memory GitHub seeded by tests.
#[derive(Default)]
pub struct MockGitHub {
    state: Mutex<MockState>,
}

fn key4(a: &str, b: &str, c: &str, d: &str) -> (String, String, String, String) {
    (a.to_string(), b.to_string(), c.to_string(), d.to_string())
}

fn key3(a: &str, b: &str, c: &str) -> (String, String, String) {
    (a.to_string(), b.to_string(), c.to_string())
}

impl MockGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_file(&self, owner: &str, repo: &str, git_ref: &str, path: &str, text: &str) {
        self.state
            .lock()
            .await
            .files
            .insert(key4(owner, repo, git_ref, path), text.to_string());
    }

    pub async fn add_manifests(
        &self,
        owner: &str,
        repo: &str,
        directory: &str,
        git_ref: &str,
        manifests: BTreeMap<String, Value>,
    ) {
        self.state
            .lock()
            .await
            .manifests
            .insert(key4(owner, repo, directory, git_ref), manifests);
    }

    pub async fn add_ref(&self, owner: &str, repo: &str, git_ref: &str, commit: &str) {
        self.state
            .lock()
            .await
            .refs
            .insert(key3(owner, repo, git_ref), commit.to_string());
    }

    pub async fn set_branches(&self, owner: &str, repo: &str, branches: Vec<Branch>) {
        self.state
            .lock()
            .await
            .branches
            .insert((owner.to_string(), repo.to_string()), branches);
    }

    pub async fn set_commits(&self, owner: &str, repo: &str, branch: &str, commits: Vec<Commit>) {
        self.state
            .lock()
            .await
            .commits
            .insert(key3(owner, repo, branch), commits);
    }
}

fn missing(what: String) -> GitHubError {
    GitHubError::NotFound(format!("{} not found", what))
}

#[async_trait]
impl GitHub for MockGitHub {
    async fn get_file(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
        path: &str,
    ) -> GitHubResult<String> {
        ensure_allowed(owner, repo, path)?;
        self.state
            .lock()
            .await
            .files
            .get(&key4(owner, repo, git_ref, path))
            .cloned()
            .ok_or_else(|| missing(format!("{}/{}:{}@{}", owner, repo, path, git_ref)))
    }

    async fn get_files(
        &self,
        owner: &str,
        repo: &str,
        directory: &str,
        git_ref: &str,
    ) -> GitHubResult<BTreeMap<String, Value>> {
        self.state
            .lock()
            .await
            .manifests
            .get(&key4(owner, repo, directory, git_ref))
            .cloned()
            .ok_or_else(|| missing(format!("{}/{}:{}@{}", owner, repo, directory, git_ref)))
    }

    async fn ref_to_commit(&self, owner: &str, repo: &str, git_ref: &str) -> GitHubResult<String> {
        self.state
            .lock()
            .await
            .refs
            .get(&key3(owner, repo, git_ref))
            .cloned()
            .ok_or_else(|| missing(format!("{}/{}@{}", owner, repo, git_ref)))
    }

    async fn list_branches(&self, owner: &str, repo: &str) -> GitHubResult<Vec<Branch>> {
        Ok(self
            .state
            .lock()
            .await
            .branches
            .get(&(owner.to_string(), repo.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_commits(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> GitHubResult<Vec<Commit>> {
        self.state
            .lock()
            .await
            .commits
            .get(&key3(owner, repo, branch))
            .cloned()
            .ok_or_else(|| missing(format!("{}/{}@{}", owner, repo, branch)))
    }
}
