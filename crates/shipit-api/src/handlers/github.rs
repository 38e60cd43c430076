// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! GitHub browsing for the release UI. Every route needs the `github` scope.

use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Value, json};

use shipit_core::scopes::scope;

use crate::auth::Principal;
use crate::error::Result;
use crate::github::{self as gh, Branch, Commit};
use crate::state::AppState;

fn require_github(principal: &Principal) -> Result<()> {
    principal.require_permission(&scope("github"))
}

pub async fn list_branches(
    State(state): State<AppState>,
    principal: Principal,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<Json<Vec<Branch>>> {
    require_github(&principal)?;
    Ok(Json(state.github.list_branches(&owner, &repo).await?))
}

pub async fn list_commits(
    State(state): State<AppState>,
    principal: Principal,
    Path((owner, repo, branch)): Path<(String, String, String)>,
) -> Result<Json<Vec<Commit>>> {
    require_github(&principal)?;
    Ok(Json(state.github.list_commits(&owner, &repo, &branch).await?))
}

/// `{"xpis": [...]}` of a manifest repository revision.
pub async fn list_xpis(
    State(state): State<AppState>,
    principal: Principal,
    Path((owner, repo, revision)): Path<(String, String, String)>,
) -> Result<Json<Value>> {
    require_github(&principal)?;
    let xpis = gh::list_xpis(
        state.github.as_ref(),
        &owner,
        &repo,
        &revision,
        state.config.github.skip_private_repos,
    )
    .await?;
    Ok(Json(json!({ "xpis": xpis })))
}

/// Text of one of the repository's allowed files.
pub async fn get_file(
    State(state): State<AppState>,
    principal: Principal,
    Path((owner, repo, git_ref, path)): Path<(String, String, String, String)>,
) -> Result<String> {
    require_github(&principal)?;
    Ok(state.github.get_file(&owner, &repo, &git_ref, &path).await?)
}
