// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! GitHub GraphQL client.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::debug;

use super::{Branch, Commit, GitHub, GitHubError, GitHubResult, ensure_allowed};
use crate::config::GitHubConfig;

const BRANCH_PAGE_SIZE: u32 = 100;
const COMMIT_HISTORY_SIZE: u32 = 10;

const BLOB_QUERY: &str = r#"
query($owner: String!, $repo: String!, $expression: String!) {
  repository(owner: $owner, name: $repo) {
    object(expression: $expression) {
      ... on Blob { text }
    }
  }
}
"#;

const TREE_QUERY: &str = r#"
query($owner: String!, $repo: String!, $expression: String!) {
  repository(owner: $owner, name: $repo) {
    object(expression: $expression) {
      ... on Tree {
        entries {
          name
          type
          object {
            ... on Blob { text }
          }
        }
      }
    }
  }
}
"#;

const REF_QUERY: &str = r#"
query($owner: String!, $repo: String!, $ref: String!) {
  repository(owner: $owner, name: $repo) {
    ref(qualifiedName: $ref) {
      target {
        ... on Commit { oid }
      }
    }
  }
}
"#;

const BRANCHES_QUERY: &str = r#"
query($owner: String!, $repo: String!, $limit: Int!, $after: String) {
  repository(owner: $owner, name: $repo) {
    refs(first: $limit, after: $after, refPrefix: "refs/heads/") {
      nodes {
        name
        target {
          ... on Commit { committedDate }
        }
      }
      pageInfo {
        endCursor
        hasNextPage
      }
    }
  }
}
"#;

const COMMITS_QUERY: &str = r#"
query($owner: String!, $repo: String!, $ref: String!, $limit: Int!) {
  repository(owner: $owner, name: $repo) {
    ref(qualifiedName: $ref) {
      target {
        ... on Commit {
          history(first: $limit) {
            edges {
              node {
                author { email name }
                committer { date }
                messageHeadline
                oid
              }
            }
          }
        }
      }
    }
  }
}
"#;

/// GitHub client over the GraphQL endpoint with a bearer token.
pub struct GraphQlClient {
    api_url: String,
    token: Option<String>,
    http_client: reqwest::Client,
}

impl GraphQlClient {
    pub fn new(config: &GitHubConfig) -> Self {
        Self {
            api_url: config.api_url.clone(),
            token: config.token.clone(),
            http_client: reqwest::Client::new(),
        }
    }

    async fn query(&self, query: &str, variables: Value) -> GitHubResult<Value> {
        let token = self.token.as_deref().ok_or(GitHubError::MissingToken)?;
        let response = self
            .http_client
            .post(&self.api_url)
            .bearer_auth(token)
            // GitHub rejects requests without a user agent
            .header(reqwest::header::USER_AGENT, "shipit-api")
            .json(&json!({"query": query, "variables": variables}))
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        if let Some(errors) = body.get("errors") {
            return Err(GitHubError::Query(errors.to_string()));
        }
        Ok(body)
    }
}

fn required<'a>(body: &'a Value, pointer: &str, what: &str) -> GitHubResult<&'a Value> {
    body.pointer(pointer)
        .filter(|v| !v.is_null())
        .ok_or_else(|| GitHubError::NotFound(format!("{} not found", what)))
}

fn text(value: &Value, pointer: &str) -> String {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl GitHub for GraphQlClient {
    async fn get_file(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
        path: &str,
    ) -> GitHubResult<String> {
        ensure_allowed(owner, repo, path)?;
        let path = urlencoding::decode(path)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| path.to_string());
        let body = self
            .query(
                BLOB_QUERY,
                json!({"owner": owner, "repo": repo, "expression": format!("{}:{}", git_ref, path)}),
            )
            .await?;
        let what = format!("{}/{}:{}@{}", owner, repo, path, git_ref);
        let content = required(&body, "/data/repository/object/text", &what)?;
        Ok(content.as_str().unwrap_or_default().to_string())
    }

    async fn get_files(
        &self,
        owner: &str,
        repo: &str,
        directory: &str,
        git_ref: &str,
    ) -> GitHubResult<BTreeMap<String, Value>> {
        let body = self
            .query(
                TREE_QUERY,
                json!({"owner": owner, "repo": repo, "expression": format!("{}:{}", git_ref, directory)}),
            )
            .await?;
        let what = format!("{}/{}:{}@{}", owner, repo, directory, git_ref);
        let entries = required(&body, "/data/repository/object/entries", &what)?
            .as_array()
            .cloned()
            .unwrap_or_default();

        let mut manifests = BTreeMap::new();
        for entry in entries {
            let file_name = text(&entry, "/name");
            let Some(name) = file_name.strip_suffix(".yml") else {
                continue;
            };
            let mut manifest: Value = serde_yaml::from_str(&text(&entry, "/object/text"))
                .map_err(|e| GitHubError::InvalidManifest(format!("{}: {}", file_name, e)))?;
            if let Value::Object(map) = &mut manifest {
                map.insert("name".into(), json!(name));
            }
            manifests.insert(name.to_string(), manifest);
        }
        debug!(owner = %owner, repo = %repo, count = manifests.len(), "Loaded manifests");
        Ok(manifests)
    }

    async fn ref_to_commit(&self, owner: &str, repo: &str, git_ref: &str) -> GitHubResult<String> {
        let body = self
            .query(REF_QUERY, json!({"owner": owner, "repo": repo, "ref": git_ref}))
            .await?;
        let what = format!("{}/{}@{}", owner, repo, git_ref);
        let oid = required(&body, "/data/repository/ref/target/oid", &what)?;
        Ok(oid.as_str().unwrap_or_default().to_string())
    }

    async fn list_branches(&self, owner: &str, repo: &str) -> GitHubResult<Vec<Branch>> {
        let mut branches = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let body = self
                .query(
                    BRANCHES_QUERY,
                    json!({"owner": owner, "repo": repo, "limit": BRANCH_PAGE_SIZE, "after": after}),
                )
                .await?;
            let refs = required(&body, "/data/repository/refs", &format!("{}/{}", owner, repo))?;

            if let Some(nodes) = refs.get("nodes").and_then(Value::as_array) {
                branches.extend(nodes.iter().map(|node| Branch {
                    name: text(node, "/name"),
                    committer_date: text(node, "/target/committedDate"),
                }));
            }

            let has_next = refs
                .pointer("/pageInfo/hasNextPage")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            after = refs
                .pointer("/pageInfo/endCursor")
                .and_then(Value::as_str)
                .map(String::from);
            if !has_next || after.is_none() {
                break;
            }
        }
        Ok(branches)
    }

    async fn list_commits(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> GitHubResult<Vec<Commit>> {
        let body = self
            .query(
                COMMITS_QUERY,
                json!({"owner": owner, "repo": repo, "ref": branch, "limit": COMMIT_HISTORY_SIZE}),
            )
            .await?;
        let what = format!("{}/{}@{}", owner, repo, branch);
        let edges = required(&body, "/data/repository/ref/target/history/edges", &what)?
            .as_array()
            .cloned()
            .unwrap_or_default();

        Ok(edges
            .iter()
            .map(|edge| Commit {
                author: format!(
                    "{} <{}>",
                    text(edge, "/node/author/name"),
                    text(edge, "/node/author/email")
                ),
                committer_date: text(edge, "/node/committer/date"),
                message: text(edge, "/node/messageHeadline"),
                revision: text(edge, "/node/oid"),
            })
            .collect())
    }
}
