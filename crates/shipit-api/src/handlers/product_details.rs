// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! On-demand product details rebuilds.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};
use tracing::info;

use shipit_core::scopes::scope;

use crate::auth::Principal;
use crate::db;
use crate::error::Result;
use crate::state::AppState;

/// Queue a rebuild for the worker.
pub async fn rebuild_product_details(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Value>> {
    principal.require_permission(&scope("rebuild_product_details"))?;

    let request_id =
        db::enqueue_rebuild(&state.pool, &json!({"requested_by": principal.id()})).await?;
    info!(request_id, user = %principal.id(), "Product details rebuild requested");
    Ok(Json(json!({"status": "ok"})))
}
