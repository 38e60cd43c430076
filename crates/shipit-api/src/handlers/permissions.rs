// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

use axum::Json;
use serde_json::{Value, json};

use crate::auth::Principal;

/// Permissions of the caller, as the release UI shows them.
pub async fn get_permissions(principal: Principal) -> Json<Value> {
    Json(json!({
        "description": "Permissions of a logged in user",
        "user_id": principal.id(),
        "permissions": principal.permissions(),
    }))
}
