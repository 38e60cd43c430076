// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Phase signoffs of product releases.

use axum::Json;
use axum::extract::{Path, State};
use serde_json::Value;
use tracing::info;

use shipit_core::scopes::scope;

use super::releases::schedule_release_phase;
use super::{find_phase, get_product_release, signoff_uid, signoffs_json};
use crate::auth::Principal;
use crate::db::{self, ReleaseKind};
use crate::error::{Error, Result};
use crate::state::AppState;

pub async fn get_phase_signoffs(
    State(state): State<AppState>,
    Path((name, phase)): Path<(String, String)>,
) -> Result<Json<Value>> {
    let release = get_product_release(&state, &name).await?;
    let phases = db::get_phases(&state.pool, ReleaseKind::Product, release.id).await?;
    let phase = find_phase(&phases, &phase)?;
    let signoffs = db::get_signoffs(&state.pool, ReleaseKind::Product, phase.id).await?;
    Ok(Json(signoffs_json(&signoffs)))
}

/// Sign one of a phase's signoffs. The body is the signoff uid.
///
/// The phase is scheduled once every signoff is signed.
pub async fn phase_signoff(
    State(state): State<AppState>,
    principal: Principal,
    Path((name, phase)): Path<(String, String)>,
    body: String,
) -> Result<Json<Value>> {
    let uid = signoff_uid(&body);
    let signoff = db::get_signoff_by_uid(&state.pool, ReleaseKind::Product, &uid)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Signoff {} not found", uid)))?;
    if signoff.signed {
        return Err(Error::Conflict("Already signed off".into()));
    }

    let release = get_product_release(&state, &name).await?;
    let phases = db::get_phases(&state.pool, ReleaseKind::Product, release.id).await?;
    let phase_obj = find_phase(&phases, &phase)?;
    if signoff.phase_id != phase_obj.id {
        return Err(Error::NotFound(format!(
            "Signoff {} not found in phase {}",
            uid, phase_obj.name
        )));
    }
    principal.require_permission(&scope(&format!(
        "phase_signoff/{}/{}",
        release.product, phase_obj.name
    )))?;

    let who = principal.id().to_string();
    let phase_signoffs = db::get_signoffs(&state.pool, ReleaseKind::Product, phase_obj.id).await?;
    if phase_signoffs
        .iter()
        .any(|s| s.completed_by.as_deref() == Some(who.as_str()))
    {
        return Err(Error::Conflict(format!("Already signed off by {}", who)));
    }

    let allowed = state
        .config
        .signoff_groups
        .get(&signoff.permissions)
        .map(Vec::as_slice)
        .unwrap_or_default();
    if !principal.groups().iter().any(|g| allowed.contains(g)) {
        return Err(Error::Unauthorized(format!(
            "User `{}` is not in the `{}`",
            who, signoff.permissions
        )));
    }

    if !db::sign_signoff(&state.pool, ReleaseKind::Product, signoff.id, &who).await? {
        return Err(Error::Conflict("Already signed off".into()));
    }
    let signoffs = db::get_signoffs(&state.pool, ReleaseKind::Product, phase_obj.id).await?;

    if signoffs.iter().all(|s| s.signed) {
        schedule_release_phase(&state, &principal, &release, &phase_obj.name).await?;
    }

    info!(phase = %phase_obj.name, release = %release.name, user = %who, "Phase signed off");
    state
        .notifier
        .notify_via_matrix(
            &release.product,
            &format!("{} of {} signed off by {}.", phase_obj.name, release.name, who),
        )
        .await;

    Ok(Json(signoffs_json(&signoffs)))
}
