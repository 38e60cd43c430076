// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for shipit-api.
//!
//! Every error leaving a handler is rendered as a problem document:
//! `{"status", "title", "detail", "type", "instance"}`.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::github::GitHubError;
use crate::taskcluster::TaskclusterError;

/// API errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Outgoing HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A git command of the product details working copy failed.
    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    /// A release rule was violated.
    #[error(transparent)]
    Core(#[from] shipit_core::Error),

    /// Taskcluster call failed.
    #[error(transparent)]
    Taskcluster(#[from] TaskclusterError),

    /// GitHub query failed.
    #[error(transparent)]
    GitHub(#[from] GitHubError),

    /// Missing credentials or permissions.
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    /// The request conflicts with the current state.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    /// An upstream service answered with an error.
    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),
}

/// Result type using API Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status of the error.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Error::Core(e) => match e {
                shipit_core::Error::NotFound(_) => StatusCode::NOT_FOUND,
                shipit_core::Error::UnknownProduct(_)
                | shipit_core::Error::InvalidVersion { .. }
                | shipit_core::Error::UnsupportedFlavor(_)
                | shipit_core::Error::Ambiguous(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::GitHub(e) => e.status(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A problem document with the given status and detail.
pub fn problem(status: StatusCode, detail: &str) -> Response {
    let body = json!({
        "status": status.as_u16(),
        "title": status.canonical_reason().unwrap_or("Error"),
        "detail": detail,
        "type": "about:blank",
        "instance": "about:blank",
    });
    (
        status,
        [(header::CONTENT_TYPE, "application/problem+json")],
        body.to_string(),
    )
        .into_response()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        problem(status, &self.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        Error::Unauthorized(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Error::Conflict("Already submitted!".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::Core(shipit_core::Error::UnsupportedFlavor("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Core(shipit_core::Error::NotFound("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::Database(sqlx::Error::RowNotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_problem_body() {
        let response = Error::NotFound("Release Firefox-1.0-build1 not found".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/problem+json"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], 404);
        assert_eq!(body["title"], "Not Found");
        assert_eq!(body["detail"], "Release Firefox-1.0-build1 not found");
        assert_eq!(body["type"], "about:blank");
    }
}
