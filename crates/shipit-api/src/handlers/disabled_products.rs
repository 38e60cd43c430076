// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Products whose automated (Taskcluster) submissions are disabled per branch.

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use shipit_core::scopes::scope;

use crate::auth::Principal;
use crate::db;
use crate::error::{Error, Result};
use crate::state::AppState;

/// A product branch, as body of `POST` and query of `DELETE`.
#[derive(Debug, Deserialize)]
pub struct ProductBranch {
    pub product: String,
    pub branch: String,
}

/// `{product: [branch, ...]}`
pub async fn list_disabled_products(State(state): State<AppState>) -> Result<Json<Value>> {
    let disabled = db::list_disabled_products(&state.pool).await?;
    Ok(Json(json!(disabled)))
}

pub async fn disable_product(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<ProductBranch>,
) -> Result<Json<Value>> {
    principal.require_permission(&scope(&format!("disable_product/{}", body.product)))?;

    db::disable_product(&state.pool, &body.product, &body.branch).await?;
    info!(product = %body.product, branch = %body.branch, user = %principal.id(), "Disabled product");
    state
        .notifier
        .notify_via_matrix(
            &body.product,
            &format!(
                "Automatic releases disabled for {} on {}",
                body.product, body.branch
            ),
        )
        .await;
    Ok(Json(json!({"product": body.product, "branch": body.branch})))
}

pub async fn enable_product(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<ProductBranch>,
) -> Result<Json<Value>> {
    principal.require_permission(&scope(&format!("enable_product/{}", query.product)))?;

    if !db::enable_product(&state.pool, &query.product, &query.branch).await? {
        return Err(Error::NotFound(format!(
            "{} is not disabled on {}",
            query.product, query.branch
        )));
    }
    info!(product = %query.product, branch = %query.branch, user = %principal.id(), "Enabled product");
    state
        .notifier
        .notify_via_matrix(
            &query.product,
            &format!(
                "Automatic releases enabled for {} on {}",
                query.product, query.branch
            ),
        )
        .await;
    Ok(Json(json!({"product": query.product, "branch": query.branch})))
}
