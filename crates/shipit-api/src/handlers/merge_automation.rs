// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Merge automation: scheduled merge-day repository merges.
//!
//! An automation is created pending, started by triggering the
//! `merge-automation` action of its revision's decision task, and followed
//! through the action's task group until it is marked completed.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{error, info};

use shipit_core::hooks::{find_action, render_action_hook};
use shipit_core::merge::{
    MERGE_AUTOMATION_ACTION, MergeBehavior, TaskStatus, behavior, behaviors_for,
    merge_action_input, merge_products, task_group_status,
};
use shipit_core::scopes::scope;

use crate::auth::Principal;
use crate::db::{self, MergeAutomation, NewMergeAutomation};
use crate::error::{Error, Result};
use crate::state::AppState;

/// Body of `POST /merge-automation`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub product: String,
    pub behavior: String,
    pub revision: String,
    pub version: String,
    /// Merges are dry runs unless asked otherwise.
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    #[serde(default)]
    pub commit_message: Option<String>,
    #[serde(default)]
    pub commit_author: Option<String>,
}

fn default_dry_run() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub product: String,
}

fn not_found(id: i32) -> Error {
    Error::NotFound(format!("Merge automation with id {} not found", id))
}

pub async fn list_products() -> Json<Vec<String>> {
    Json(merge_products())
}

pub async fn list_behaviors(
    State(state): State<AppState>,
    Path(product): Path<String>,
) -> Result<Json<Vec<MergeBehavior>>> {
    Ok(Json(behaviors_for(&product, state.environment())?))
}

pub async fn submit_merge_automation(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    principal.require_permission(&scope(&format!("add_merge_automation/{}", body.product)))?;
    let merge_behavior = behavior(&body.product, &body.behavior, state.environment())?;

    let automation = db::create_merge_automation(
        &state.pool,
        &NewMergeAutomation {
            product: body.product,
            behavior: body.behavior,
            revision: body.revision,
            version: body.version,
            dry_run: body.dry_run,
            commit_message: body.commit_message,
            commit_author: body.commit_author,
            repo: merge_behavior.repo,
            pretty_name: merge_behavior.pretty_name,
            project: merge_behavior.project,
        },
    )
    .await?;
    info!(id = automation.id, behavior = %automation.behavior, user = %principal.id(), "Merge automation created");

    Ok((
        StatusCode::CREATED,
        Json(json!({"message": "Merge automation created successfully"})),
    ))
}

pub async fn list_merge_automations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>> {
    let automations = db::list_merge_automations(&state.pool, &query.product).await?;
    Ok(Json(Value::Array(
        automations.iter().map(MergeAutomation::to_json).collect(),
    )))
}

/// Cancel the automation's task group, if it was started.
pub async fn cancel_merge_automation(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<Json<Value>> {
    let automation = db::get_merge_automation(&state.pool, id)
        .await?
        .ok_or_else(|| not_found(id))?;
    principal.require_permission(&scope(&format!(
        "cancel_merge_automation/{}",
        automation.product
    )))?;

    info!(id, "Cancelling merge automation");
    if let Some(task_id) = &automation.task_id {
        state
            .taskcluster
            .cancel_task_group(task_id)
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
    }

    let canceled = db::set_merge_automation_status(&state.pool, id, TaskStatus::Canceled).await?;
    Ok(Json(canceled.to_json()))
}

pub async fn mark_merge_automation_completed(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<Json<Value>> {
    let mut tx = state.pool.begin().await?;
    let automation = db::lock_merge_automation(&mut tx, id)
        .await?
        .ok_or_else(|| not_found(id))?;
    principal.require_permission(&scope(&format!(
        "mark_merge_automation_completed/{}",
        automation.product
    )))?;

    let status = automation.task_status();
    if status.is_final() {
        return Err(Error::Conflict(format!(
            "Cannot update automation in {} status",
            status.display_name()
        )));
    }

    let completed = db::set_merge_automation_status(&mut *tx, id, TaskStatus::Completed).await?;
    tx.commit().await?;
    info!(id, "Merge automation marked as completed");
    Ok(Json(completed.to_json()))
}

/// Trigger the `merge-automation` action of the automation's revision.
async fn trigger_merge_action(state: &AppState, automation: &MergeAutomation) -> Result<String> {
    let decisions = &state.decisions;
    let decision_task_id = decisions
        .find_decision_task_id(&automation.repo, &automation.project, &automation.revision)
        .await?;
    let actions = decisions.get_actions(&decision_task_id).await?;
    let merge_action = find_action(MERGE_AUTOMATION_ACTION, &actions)
        .ok_or_else(|| {
            Error::NotFound("merge-automation action not found in decision task".into())
        })?
        .clone();
    let parameters = decisions.get_parameters(&decision_task_id).await?;

    let mut context = Map::new();
    context.insert("parameters".into(), parameters);
    context.insert("taskGroupId".into(), json!(decision_task_id));
    context.insert("taskId".into(), Value::Null);
    context.insert("task".into(), Value::Null);
    context.insert(
        "input".into(),
        merge_action_input(&automation.behavior, automation.dry_run, automation.id),
    );
    context.insert("clientId".into(), json!(state.taskcluster.client_id()));

    let payload = render_action_hook(
        merge_action.get("hookPayload").unwrap_or(&Value::Null),
        &context,
        &[],
    )?;
    let field = |key: &str| merge_action.get(key).and_then(Value::as_str).unwrap_or_default();
    let task_id = state
        .taskcluster
        .trigger_hook(field("hookGroupId"), field("hookId"), &payload)
        .await?;
    info!(task_id = %task_id, "Triggered merge automation action");
    Ok(task_id)
}

pub async fn start_merge_automation(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<Json<Value>> {
    let mut tx = state.pool.begin().await?;
    let automation = db::lock_merge_automation(&mut tx, id)
        .await?
        .ok_or_else(|| not_found(id))?;
    principal.require_permission(&scope(&format!(
        "add_merge_automation/{}",
        automation.product
    )))?;

    let status = automation.task_status();
    if status != TaskStatus::Pending {
        return Err(Error::Conflict(format!(
            "Cannot start automation in {} status",
            status.display_name()
        )));
    }

    let started = async {
        let task_id = trigger_merge_action(&state, &automation).await?;
        db::set_merge_automation_started(&mut tx, id, &task_id).await?;
        Ok::<_, Error>(task_id)
    }
    .await;

    match started {
        Ok(task_id) => {
            tx.commit().await?;
            info!(id, task_id = %task_id, "Started merge automation");
            Ok(Json(json!({
                "message": "Merge automation started successfully",
                "task_id": task_id,
            })))
        }
        Err(e) => {
            tx.rollback().await?;
            error!(id, error = %e, "Failed to start merge automation");
            Err(Error::Internal(format!(
                "Failed to start merge automation: {}",
                e
            )))
        }
    }
}

/// Decision task state and overall task group status of a started
/// automation. Completed and failed groups are recorded.
pub async fn get_task_status(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Value>> {
    let automation = db::get_merge_automation(&state.pool, id)
        .await?
        .filter(|a| a.task_id.is_some())
        .ok_or_else(|| Error::NotFound("Automation not found or no task ID".into()))?;
    let task_id = automation.task_id.clone().unwrap_or_default();

    let status = automation.task_status();
    if status.is_final() {
        return Ok(Json(json!({
            "automation": automation.to_json(),
            "decisionTask": {"taskId": task_id, "state": status.as_str()},
            "taskGroup": {"overallStatus": status.as_str()},
        })));
    }

    let decision_state = state.taskcluster.task_state(&task_id).await?;
    let overall = if decision_state == "completed" {
        match state.taskcluster.list_task_group(&task_id).await {
            Ok(tasks) => {
                let states: Vec<&str> = tasks.iter().map(|t| t.state.as_str()).collect();
                task_group_status(&states)
            }
            Err(e) if e.status_code() == Some(404) => TaskStatus::Pending,
            Err(e) => return Err(e.into()),
        }
    } else {
        TaskStatus::Pending
    };

    let automation = if matches!(overall, TaskStatus::Completed | TaskStatus::Failed)
        && overall != status
    {
        info!(id, status = %overall, "Merge automation task group finished");
        db::set_merge_automation_status(&state.pool, id, overall).await?
    } else {
        automation
    };

    Ok(Json(json!({
        "automation": automation.to_json(),
        "decisionTask": {"taskId": task_id, "state": decision_state},
        "taskGroup": {"overallStatus": overall.as_str()},
    })))
}
