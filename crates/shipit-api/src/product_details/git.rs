// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Working copy of the product details repository.

use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::retry::{RetryConfig, retry_with_backoff};

const ROBOT_EMAIL: &str = "release-services+robot@mozilla.com";
const ROBOT_NAME: &str = "Release Services Robot";

/// Replace every secret in `text` with asterisks.
pub fn hide_secrets(text: &str, secrets: &[String]) -> String {
    secrets
        .iter()
        .filter(|s| !s.is_empty())
        .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), "*****"))
}

/// Password of a repository URL, if any.
fn url_password(repo_url: &str) -> Option<String> {
    let parsed = url::Url::parse(repo_url).ok()?;
    let password = parsed.password()?;
    Some(
        urlencoding::decode(password)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| password.to_string()),
    )
    .filter(|p| !p.is_empty())
}

/// A clone of the product details repository on one branch.
#[derive(Debug, Clone)]
pub struct WorkingCopy {
    dir: PathBuf,
    repo_url: String,
    branch: String,
    secrets: Vec<String>,
    retry: RetryConfig,
}

impl WorkingCopy {
    pub fn new(dir: &Path, repo_url: &str, branch: &str) -> Self {
        let secrets = url_password(repo_url)
            .into_iter()
            .flat_map(|p| {
                let encoded = urlencoding::encode(&p).into_owned();
                [p, encoded]
            })
            .collect();
        Self {
            dir: dir.to_path_buf(),
            repo_url: repo_url.to_string(),
            branch: branch.to_string(),
            secrets,
            retry: RetryConfig::with_max_attempts(3),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Repository URL safe for logs.
    pub fn display_url(&self) -> String {
        hide_secrets(&self.repo_url, &self.secrets)
    }

    async fn git(&self, args: &[&str], cwd: &Path) -> Result<String> {
        let shown = hide_secrets(&args.join(" "), &self.secrets);
        let command = shown.as_str();
        let secrets = self.secrets.as_slice();
        retry_with_backoff(&self.retry, &format!("git {}", command), move || async move {
            debug!(command = %command, "Running git");
            let output = Command::new("git")
                .args(args)
                .current_dir(cwd)
                .output()
                .await?;
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            } else {
                Err(Error::Git {
                    command: command.to_string(),
                    stderr: hide_secrets(String::from_utf8_lossy(&output.stderr).trim(), secrets),
                })
            }
        })
        .await
    }

    /// Clone the branch, or bring an existing clone to the branch tip with
    /// no local changes. `clean` starts from a fresh clone.
    pub async fn sync(&self, clean: bool) -> Result<()> {
        if clean && self.dir.exists() {
            tokio::fs::remove_dir_all(&self.dir).await?;
        }

        info!(repo = %self.display_url(), branch = %self.branch, "Getting latest product details");
        if self.dir.exists() {
            self.git(&["checkout", &self.branch], &self.dir).await?;
            self.git(&["pull"], &self.dir).await?;
            self.git(&["reset", "--hard", "HEAD"], &self.dir).await?;
            self.git(&["clean", "-xfd"], &self.dir).await?;
            return Ok(());
        }

        let parent = self
            .dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        tokio::fs::create_dir_all(parent).await?;
        let name = self
            .dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Internal(format!("Invalid working copy {}", self.dir.display())))?;
        self.git(&["clone", "-b", &self.branch, &self.repo_url, name], parent)
            .await?;
        self.git(&["config", "http.postBuffer", "12M"], &self.dir).await?;
        self.git(&["config", "user.email", ROBOT_EMAIL], &self.dir).await?;
        self.git(&["config", "user.name", ROBOT_NAME], &self.dir).await?;
        Ok(())
    }

    /// Stage everything, and commit and push when the tree changed.
    /// Returns whether a commit was pushed.
    pub async fn commit_and_push(&self, message: &str) -> Result<bool> {
        self.git(&["add", "."], &self.dir).await?;
        let status = self.git(&["status", "--short"], &self.dir).await?;
        if status.trim().is_empty() {
            info!("Product details did not change");
            return Ok(false);
        }
        self.git(&["commit", "-m", message], &self.dir).await?;
        self.git(&["push", "origin", &self.branch], &self.dir).await?;
        info!(branch = %self.branch, "Pushed product details");
        Ok(true)
    }
}
