// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dockerflow endpoints: `/__heartbeat__`, `/__lbheartbeat__`, `/__version__`.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tracing::{error, warn};

use crate::error::{Error, Result};
use crate::state::AppState;

/// Healthy when the database answers.
pub async fn heartbeat(State(state): State<AppState>) -> Response {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => Json(json!({"database": "ok"})).into_response(),
        Err(e) => {
            error!(error = %e, "Heartbeat database check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"database": e.to_string()})),
            )
                .into_response()
        }
    }
}

/// Load balancer check: the process is up.
pub async fn lbheartbeat() -> Json<Value> {
    Json(json!({}))
}

/// Contents of the deployed `version.json`.
pub async fn version(State(state): State<AppState>) -> Result<Json<Value>> {
    let path = &state.config.version_file;
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        warn!(path = %path.display(), error = %e, "Cannot read version file");
        Error::NotFound(format!("{} not found", path.display()))
    })?;
    Ok(Json(serde_json::from_str(&text)?))
}
