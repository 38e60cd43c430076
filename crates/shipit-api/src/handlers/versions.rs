// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Current version of a product channel (`firefox`/`nightly`).

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::db;
use crate::error::Result;
use crate::state::AppState;

/// The version as a JSON string, or 404 with an `error` message.
pub async fn get_version(
    State(state): State<AppState>,
    Path((product, channel)): Path<(String, String)>,
) -> Result<Response> {
    let response = match db::get_version(&state.pool, &product, &channel).await? {
        Some(version) => Json(json!(version)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": format!("No version found for {} {}.", product, channel),
            })),
        )
            .into_response(),
    };
    Ok(response)
}
