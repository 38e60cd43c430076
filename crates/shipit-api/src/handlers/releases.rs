// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Product release handlers: create, list, schedule phases, abandon.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use shipit_core::flavors::product_signoffs;
use shipit_core::hooks::{FlavorQuery, find_action, generate_action_hook, render_action_hook};
use shipit_core::product::product_to_appname;
use shipit_core::release::{ActionInputSource, ReleaseStatus, common_action_input, release_name};
use shipit_core::scopes::scope;

use super::{
    ListParams, do_schedule_phase, find_phase, get_product_release, release_not_found,
    sort_by_product_then_version, task_group_url,
};
use crate::auth::Principal;
use crate::db::{self, NewRelease, Release, ReleaseFilter, ReleaseKind};
use crate::error::{Error, Result};
use crate::product_details::l10n::get_locales;
use crate::state::AppState;
use crate::taskcluster::{PhaseSource, TaskclusterError};

/// Products whose betas get their partials picked automatically.
const AUTO_PARTIAL_PRODUCTS: &[&str] = &["firefox", "devedition", "pinebuild"];

/// Branches automated betas are built from.
const AUTO_PARTIAL_BRANCHES: &[&str] = &["try", "releases/mozilla-beta", "projects/maple"];

/// Number of shipped releases offered as partials.
const MAX_SUGGESTED_PARTIALS: usize = 3;

/// Actions cancelling a release's tasks don't need these parameters.
const CANCEL_DELETED_PARAMETERS: &[&str] =
    &["existing_tasks", "release_history", "release_partner_config"];

/// Body of `POST /releases`.
#[derive(Debug, Deserialize)]
pub struct AddReleaseRequest {
    pub product: String,
    pub branch: String,
    pub version: String,
    pub revision: String,
    pub build_number: i32,
    #[serde(default)]
    pub release_eta: Option<String>,
    /// `{version: {buildNumber, locales}}`, or `"auto"`.
    #[serde(default)]
    pub partial_updates: Option<Value>,
    #[serde(default)]
    pub product_key: Option<String>,
    /// Git repository; empty for Mercurial products.
    #[serde(default)]
    pub repo_url: String,
}

/// Body of `PATCH /releases/{name}`.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

pub(crate) async fn release_json(state: &AppState, release: &Release) -> Result<Value> {
    let phases = db::get_phases(&state.pool, ReleaseKind::Product, release.id).await?;
    Ok(release.to_json(&phases))
}

/// Errors reported to the submitter as a bad request.
fn submission_error(e: Error) -> Error {
    match e {
        Error::Taskcluster(e) => Error::BadRequest(e.to_string()),
        Error::Database(e)
            if e.as_database_error()
                .is_some_and(|db| db.is_unique_violation()) =>
        {
            Error::BadRequest(e.to_string())
        }
        other => other,
    }
}

pub async fn list_releases(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Value>> {
    let params = ListParams::new(params);
    let filter = ReleaseFilter {
        product: params.get("product"),
        branch: params.get("branch"),
        version: params.get("version"),
        build_number: params.build_number("version")?,
        statuses: params.statuses(),
    };

    let releases = db::list_releases(&state.pool, &filter).await?;
    let mut body = Vec::new();
    for release in sort_by_product_then_version(releases) {
        body.push(release_json(&state, &release).await?);
    }
    Ok(Json(Value::Array(body)))
}

/// The latest shipped releases of a product branch with their locales.
async fn suggest_partials(state: &AppState, product: &str, branch: &str) -> Result<Value> {
    let shipped = db::shipped_releases(&state.pool, product, branch).await?;
    let appname = product_to_appname(product)
        .ok_or_else(|| Error::BadRequest(format!("No locales known for {}", product)))?;

    let mut partials = Map::new();
    for release in sort_by_product_then_version(shipped)
        .iter()
        .rev()
        .take(MAX_SUGGESTED_PARTIALS)
    {
        let locales = get_locales(
            &state.http,
            &state.config.product_details.hg_prefix,
            &release.branch,
            &release.revision,
            appname,
        )
        .await
        .map_err(|e| Error::BadRequest(format!("Cannot fetch locales of {}: {}", release.name, e)))?;
        partials.insert(
            release.version.clone(),
            json!({"buildNumber": release.build_number, "locales": locales}),
        );
    }
    Ok(Value::Object(partials))
}

pub async fn add_release(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<AddReleaseRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    principal.require_permission(&scope(&format!("add_release/{}", body.product)))?;

    if principal.is_taskcluster()
        && db::is_product_disabled(&state.pool, &body.product, &body.branch).await?
    {
        return Err(Error::Unauthorized(
            "Taskcluster based submissions are disabled".into(),
        ));
    }

    let partial_updates = match body.partial_updates {
        Some(Value::String(ref auto)) if auto == "auto" => {
            if !AUTO_PARTIAL_PRODUCTS.contains(&body.product.as_str())
                || !AUTO_PARTIAL_BRANCHES.contains(&body.branch.as_str())
            {
                return Err(Error::BadRequest(
                    "Partial suggestion works for automated betas only".into(),
                ));
            }
            Some(suggest_partials(&state, &body.product, &body.branch).await?)
        }
        other => other,
    };

    let release = NewRelease {
        product: body.product.clone(),
        version: body.version.clone(),
        branch: body.branch.clone(),
        revision: body.revision.clone(),
        build_number: body.build_number,
        release_eta: body.release_eta.clone(),
        partial_updates,
        product_key: body.product_key.clone(),
        repo_url: body.repo_url.clone(),
    };
    let name = release_name(&release.product, &release.version, release.build_number);

    let common_input = common_action_input(&ActionInputSource {
        product: &release.product,
        version: &release.version,
        build_number: release.build_number,
        release_eta: release.release_eta.as_deref(),
        partial_updates: release.partial_updates.as_ref(),
    })?;
    let partial_versions: Option<Vec<String>> = release
        .partial_updates
        .as_ref()
        .and_then(Value::as_object)
        .map(|partials| partials.keys().cloned().collect());

    let source = PhaseSource {
        repo_url: &release.repo_url,
        project: shipit_core::release::project_from_branch(&release.branch),
        revision: &release.revision,
        flavors: FlavorQuery {
            product: &release.product,
            version: &release.version,
            partial_updates: partial_versions.as_deref(),
            product_key: release.product_key.as_deref(),
        },
        verify: true,
        common_input: &common_input,
    };
    let product = release.product.clone();
    let phases = state
        .decisions
        .generate_phases(&source, |phase| product_signoffs(&product, phase))
        .await
        .map_err(submission_error)?;

    let created = db::create_release(&state.pool, &name, &release, &phases)
        .await
        .map_err(|e| submission_error(e.into()))?;

    info!(release = %created.name, user = %principal.id(), "New release");
    state
        .notifier
        .notify_via_matrix(&created.product, &format!("New release of {}", created.name))
        .await;

    Ok((StatusCode::CREATED, Json(release_json(&state, &created).await?)))
}

/// Product releases first, then XPI releases.
pub async fn get_release(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    if let Some(release) = db::get_release(&state.pool, &name).await? {
        return Ok(Json(release_json(&state, &release).await?));
    }
    if let Some(release) = db::get_xpi_release(&state.pool, &name).await? {
        return Ok(Json(super::xpi::xpi_release_json(&state, &release).await?));
    }
    Err(release_not_found(&name))
}

pub async fn update_release_status(
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

    let (product, response) = if let Some(release) = db::get_release(&state.pool, &name).await? {
        db::set_release_status(&state.pool, ReleaseKind::Product, release.id, status.as_str())
            .await?;
        let updated = get_product_release(&state, &name).await?;
        (updated.product.clone(), release_json(&state, &updated).await?)
    } else if let Some(release) = db::get_xpi_release(&state.pool, &name).await? {
        db::set_release_status(&state.pool, ReleaseKind::Xpi, release.id, status.as_str()).await?;
        let updated = db::get_xpi_release(&state.pool, &name)
            .await?
            .ok_or_else(|| release_not_found(&name))?;
        ("xpi".to_string(), super::xpi::xpi_release_json(&state, &updated).await?)
    } else {
        return Err(release_not_found(&name));
    };

    info!(release = %name, status = %status, "Release status changed");
    if status == ReleaseStatus::Shipped {
        let request_id = db::enqueue_rebuild(
            &state.pool,
            &json!({"release": name, "requested_by": principal.id()}),
        )
        .await?;
        info!(release = %name, request_id, "Product details rebuild requested");
    }
    state
        .notifier
        .notify_via_matrix(
            &product,
            &format!("Release {} status changed to `{}`.", name, status),
        )
        .await;

    Ok(Json(response))
}

/// Cancel the tasks of every scheduled phase, then mark the release aborted.
pub async fn abandon_release(
    State(state): State<AppState>,
    principal: Principal,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    let release = get_product_release(&state, &name).await?;
    principal.require_permission(&scope(&format!("abandon_release/{}", release.product)))?;

    let phases = db::get_phases(&state.pool, ReleaseKind::Product, release.id).await?;
    for phase in phases.iter().filter(|p| p.submitted && !p.skipped()) {
        let artifacts = async {
            let actions = state.decisions.get_actions(&phase.task_id).await?;
            let parameters = state.decisions.get_parameters(&phase.task_id).await?;
            Ok::<_, TaskclusterError>((actions, parameters))
        };
        let (actions, parameters) = match artifacts.await {
            Ok(found) => found,
            Err(TaskclusterError::ArtifactNotFound { .. }) => {
                info!(phase = %phase.name, task_id = %phase.task_id, "Ignoring phase without artifacts");
                continue;
            }
            Err(e) => return Err(Error::BadRequest(e.to_string())),
        };
        if find_action("cancel-all", &actions).is_none() {
            info!(phase = %phase.name, "No cancel-all action");
            continue;
        }

        let mut hook = generate_action_hook(
            &phase.task_id,
            "cancel-all",
            &actions,
            &parameters,
            json!({}),
        )?;
        hook.context
            .insert("clientId".into(), json!(state.taskcluster.client_id()));
        let payload =
            render_action_hook(&hook.hook.hook_payload, &hook.context, CANCEL_DELETED_PARAMETERS)?;
        state
            .taskcluster
            .trigger_hook(&hook.hook.hook_group_id, &hook.hook.hook_id, &payload)
            .await
            .map_err(|e| {
                warn!(phase = %phase.name, error = %e, "Failed to cancel phase tasks");
                Error::BadRequest(e.to_string())
            })?;
    }

    db::set_release_status(
        &state.pool,
        ReleaseKind::Product,
        release.id,
        ReleaseStatus::Aborted.as_str(),
    )
    .await?;
    info!(release = %release.name, user = %principal.id(), "Canceled release");
    state
        .notifier
        .notify_via_matrix(
            &release.product,
            &format!("Release {} was just canceled.", release.name),
        )
        .await;

    let release = get_product_release(&state, &name).await?;
    Ok(Json(release_json(&state, &release).await?))
}

pub async fn get_phase(
    State(state): State<AppState>,
    Path((name, phase)): Path<(String, String)>,
) -> Result<Json<Value>> {
    let release = get_product_release(&state, &name).await?;
    let phases = db::get_phases(&state.pool, ReleaseKind::Product, release.id).await?;
    Ok(Json(find_phase(&phases, &phase)?.to_json()))
}

/// Schedule a phase of a product release and announce it.
pub(crate) async fn schedule_release_phase(
    state: &AppState,
    principal: &Principal,
    release: &Release,
    phase_name: &str,
) -> Result<db::Phase> {
    let phases = db::get_phases(&state.pool, ReleaseKind::Product, release.id).await?;
    let phase = find_phase(&phases, phase_name)?;
    principal.require_permission(&scope(&format!(
        "schedule_phase/{}/{}",
        release.product, phase.name
    )))?;

    let scheduled =
        do_schedule_phase(state, principal, ReleaseKind::Product, &phases, phase_name).await?;
    let url = task_group_url(state.taskcluster.root_url(), &scheduled.task_id);
    state
        .notifier
        .notify_via_matrix(
            &release.product,
            &format!(
                "Phase {} was just scheduled for {} - {}",
                scheduled.name, release.name, url
            ),
        )
        .await;
    Ok(scheduled)
}

pub async fn schedule_phase(
    State(state): State<AppState>,
    principal: Principal,
    Path((name, phase)): Path<(String, String)>,
) -> Result<Json<Value>> {
    let release = get_product_release(&state, &name).await?;
    let scheduled = schedule_release_phase(&state, &principal, &release, &phase).await?;
    Ok(Json(scheduled.to_json()))
}
