// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! XPI (add-on) release handlers.
//!
//! Permissions depend on the add-on's manifest type, read from the XPI
//! manifest repository when the release is created and stored with it.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use shipit_core::flavors::xpi_signoffs;
use shipit_core::hooks::FlavorQuery;
use shipit_core::release::{ReleaseStatus, xpi_action_input, xpi_release_name};
use shipit_core::scopes::{scope, xpi_scope_type};

use super::releases::UpdateStatusRequest;
use super::{
    ListParams, do_schedule_phase, find_phase, release_not_found, signoff_uid, signoffs_json,
    task_group_url,
};
use crate::auth::Principal;
use crate::db::{self, NewXpiRelease, ReleaseKind, XpiRelease, XpiReleaseFilter};
use crate::error::{Error, Result};
use crate::github::get_xpi_type;
use crate::state::AppState;
use crate::taskcluster::PhaseSource;

/// Body of `POST /xpi/releases`.
#[derive(Debug, Deserialize)]
pub struct AddXpiReleaseRequest {
    pub xpi_name: String,
    pub xpi_revision: String,
    pub xpi_version: String,
    /// Revision of the manifest repository.
    pub revision: String,
    pub build_number: i32,
}

pub(crate) async fn xpi_release_json(state: &AppState, release: &XpiRelease) -> Result<Value> {
    let phases = db::get_phases(&state.pool, ReleaseKind::Xpi, release.id).await?;
    Ok(release.to_json(&phases))
}

async fn get_xpi_release_or_404(state: &AppState, name: &str) -> Result<XpiRelease> {
    db::get_xpi_release(&state.pool, name)
        .await?
        .ok_or_else(|| release_not_found(name))
}

/// `<action>/xpi/<type>` scope, where system add-ons share the `system` type.
fn xpi_scope(action: &str, xpi_type: &str, phase: Option<&str>) -> String {
    match phase {
        Some(phase) => scope(&format!("{}/xpi/{}/{}", action, xpi_scope_type(xpi_type), phase)),
        None => scope(&format!("{}/xpi/{}", action, xpi_scope_type(xpi_type))),
    }
}

pub async fn list_xpi_releases(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Value>> {
    let params = ListParams::new(params);
    let filter = XpiReleaseFilter {
        xpi_name: params.get("xpi_name"),
        xpi_version: params.get("xpi_version"),
        build_number: params.build_number("xpi_version")?,
        statuses: params.statuses(),
    };

    let mut body = Vec::new();
    for release in db::list_xpi_releases(&state.pool, &filter).await? {
        body.push(xpi_release_json(&state, &release).await?);
    }
    Ok(Json(Value::Array(body)))
}

pub async fn add_xpi_release(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<AddXpiReleaseRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let github_config = &state.config.github;
    let xpi_type = get_xpi_type(
        state.github.as_ref(),
        &github_config.xpi_manifest_owner,
        &github_config.xpi_manifest_repo,
        &body.revision,
        &body.xpi_name,
        github_config.skip_private_repos,
    )
    .await?;
    principal.require_permission(&xpi_scope("add_release", &xpi_type, None))?;

    let release = NewXpiRelease {
        build_number: body.build_number,
        xpi_name: body.xpi_name.clone(),
        xpi_revision: body.xpi_revision.clone(),
        xpi_version: body.xpi_version.clone(),
        xpi_type: xpi_type.clone(),
        // the manifest repository name is the project of its index routes
        project: github_config.xpi_manifest_repo.clone(),
        revision: body.revision.clone(),
    };
    let name = xpi_release_name(&release.xpi_name, &release.xpi_version, release.build_number);

    let common_input = xpi_action_input(
        release.build_number,
        &release.xpi_name,
        &release.xpi_revision,
        &release.xpi_version,
    );
    let source = PhaseSource {
        repo_url: "",
        project: &release.project,
        revision: &release.revision,
        flavors: FlavorQuery {
            product: "xpi",
            version: &release.xpi_version,
            partial_updates: None,
            product_key: None,
        },
        verify: false,
        common_input: &common_input,
    };
    let phases = state
        .decisions
        .generate_phases(&source, |phase| xpi_signoffs(&xpi_type, phase))
        .await
        .map_err(|e| match e {
            Error::Taskcluster(e) => Error::BadRequest(e.to_string()),
            other => other,
        })?;

    let created = db::create_xpi_release(&state.pool, &name, &release, &phases)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(|db| db.is_unique_violation()) {
                Error::BadRequest(e.to_string())
            } else {
                Error::Database(e)
            }
        })?;

    info!(release = %created.name, xpi_type = %xpi_type, user = %principal.id(), "New XPI release");
    Ok((StatusCode::CREATED, Json(xpi_release_json(&state, &created).await?)))
}

pub async fn get_xpi_release(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    let release = get_xpi_release_or_404(&state, &name).await?;
    Ok(Json(xpi_release_json(&state, &release).await?))
}

pub async fn update_xpi_release_status(
    State(state): State<AppState>,
    principal: Principal,
    Path(name): Path<String>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<Value>> {
    principal.require_permission(&scope("update_release_status"))?;
    let status: ReleaseStatus = body
        .status
        .parse()
        .map_err(|e: shipit_core::Error| Error::BadRequest(e.to_string()))?;

    let release = get_xpi_release_or_404(&state, &name).await?;
    db::set_release_status(&state.pool, ReleaseKind::Xpi, release.id, status.as_str()).await?;
    info!(release = %release.name, status = %status, "XPI release status changed");

    let release = get_xpi_release_or_404(&state, &name).await?;
    Ok(Json(xpi_release_json(&state, &release).await?))
}

/// XPI graphs have no `cancel-all` action: abandoning only marks the
/// release aborted.
pub async fn abandon_xpi_release(
    State(state): State<AppState>,
    principal: Principal,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    let release = get_xpi_release_or_404(&state, &name).await?;
    principal.require_permission(&xpi_scope("abandon_release", &release.xpi_type, None))?;

    db::set_release_status(
        &state.pool,
        ReleaseKind::Xpi,
        release.id,
        ReleaseStatus::Aborted.as_str(),
    )
    .await?;
    info!(release = %release.name, user = %principal.id(), "Canceled XPI release");

    let release = get_xpi_release_or_404(&state, &name).await?;
    Ok(Json(xpi_release_json(&state, &release).await?))
}

pub async fn get_xpi_phase(
    State(state): State<AppState>,
    Path((name, phase)): Path<(String, String)>,
) -> Result<Json<Value>> {
    let release = get_xpi_release_or_404(&state, &name).await?;
    let phases = db::get_phases(&state.pool, ReleaseKind::Xpi, release.id).await?;
    Ok(Json(find_phase(&phases, &phase)?.to_json()))
}

async fn schedule_xpi_phase(
    state: &AppState,
    principal: &Principal,
    release: &XpiRelease,
    phase_name: &str,
) -> Result<db::Phase> {
    let phases = db::get_phases(&state.pool, ReleaseKind::Xpi, release.id).await?;
    let phase = find_phase(&phases, phase_name)?;
    principal.require_permission(&xpi_scope("schedule_phase", &release.xpi_type, Some(&phase.name)))?;

    let scheduled = do_schedule_phase(state, principal, ReleaseKind::Xpi, &phases, phase_name).await?;
    info!(
        phase = %scheduled.name,
        release = %release.name,
        url = %task_group_url(state.taskcluster.root_url(), &scheduled.task_id),
        "XPI phase scheduled"
    );
    Ok(scheduled)
}

pub async fn schedule_xpi_release_phase(
    State(state): State<AppState>,
    principal: Principal,
    Path((name, phase)): Path<(String, String)>,
) -> Result<Json<Value>> {
    let release = get_xpi_release_or_404(&state, &name).await?;
    let scheduled = schedule_xpi_phase(&state, &principal, &release, &phase).await?;
    Ok(Json(scheduled.to_json()))
}

pub async fn get_xpi_phase_signoffs(
    State(state): State<AppState>,
    Path((name, phase)): Path<(String, String)>,
) -> Result<Json<Value>> {
    let release = get_xpi_release_or_404(&state, &name).await?;
    let phases = db::get_phases(&state.pool, ReleaseKind::Xpi, release.id).await?;
    let phase = find_phase(&phases, &phase)?;
    let signoffs = db::get_signoffs(&state.pool, ReleaseKind::Xpi, phase.id).await?;
    Ok(Json(signoffs_json(&signoffs)))
}

/// Sign an XPI phase signoff. The scope check stands in for group
/// membership: every member of the scope's groups may sign.
pub async fn xpi_phase_signoff(
    State(state): State<AppState>,
    principal: Principal,
    Path((name, phase)): Path<(String, String)>,
    body: String,
) -> Result<Json<Value>> {
    let uid = signoff_uid(&body);
    let signoff = db::get_signoff_by_uid(&state.pool, ReleaseKind::Xpi, &uid)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Signoff {} not found", uid)))?;
    if signoff.signed {
        return Err(Error::Conflict("Already signed off".into()));
    }

    let release = get_xpi_release_or_404(&state, &name).await?;
    let phases = db::get_phases(&state.pool, ReleaseKind::Xpi, release.id).await?;
    let phase_obj = find_phase(&phases, &phase)?;
    if signoff.phase_id != phase_obj.id {
        return Err(Error::NotFound(format!(
            "Signoff {} not found in phase {}",
            uid, phase_obj.name
        )));
    }
    principal.require_permission(&xpi_scope(
        "phase_signoff",
        &release.xpi_type,
        Some(&phase_obj.name),
    ))?;

    let who = principal.id().to_string();
    let phase_signoffs = db::get_signoffs(&state.pool, ReleaseKind::Xpi, phase_obj.id).await?;
    if phase_signoffs
        .iter()
        .any(|s| s.completed_by.as_deref() == Some(who.as_str()))
    {
        return Err(Error::Conflict(format!("Already signed off by {}", who)));
    }

    if !db::sign_signoff(&state.pool, ReleaseKind::Xpi, signoff.id, &who).await? {
        return Err(Error::Conflict("Already signed off".into()));
    }
    let signoffs = db::get_signoffs(&state.pool, ReleaseKind::Xpi, phase_obj.id).await?;

    if signoffs.iter().all(|s| s.signed) {
        schedule_xpi_phase(&state, &principal, &release, &phase_obj.name).await?;
    }

    info!(phase = %phase_obj.name, release = %release.name, user = %who, "XPI phase signed off");
    Ok(Json(signoffs_json(&signoffs)))
}

/// Signed `.xpi` of a scheduled phase; empty until the signing task is done.
pub async fn get_xpi_url(
    State(state): State<AppState>,
    Path((name, phase)): Path<(String, String)>,
) -> Result<Json<Value>> {
    let release = get_xpi_release_or_404(&state, &name).await?;
    let phases = db::get_phases(&state.pool, ReleaseKind::Xpi, release.id).await?;
    let phase = find_phase(&phases, &phase)?;
    let url = if phase.task_id.is_empty() {
        String::new()
    } else {
        state.decisions.generate_xpi_url(&phase.task_id).await
    };
    Ok(Json(json!({ "xpi_url": url })))
}
