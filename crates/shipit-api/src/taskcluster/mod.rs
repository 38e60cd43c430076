// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Taskcluster access.
//!
//! Shipit talks to five Taskcluster services: the index (decision task
//! lookup), the queue (artifacts, task and group status), hooks (starting
//! release actions), notify (Matrix messages) and auth (Hawk validation of
//! service-to-service requests).
//!
//! [`Taskcluster`] is the seam: [`TaskclusterClient`] implements it over
//! HTTP with Hawk-signed requests, [`MockTaskcluster`] keeps everything in
//! memory for tests.

mod decisions;
pub mod hawk;
mod http;
mod mock;

pub use decisions::{Decisions, PhaseSource};
pub use http::TaskclusterClient;
pub use mock::{MockTaskcluster, TriggeredHook};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Taskcluster errors.
#[derive(Debug, Error)]
pub enum TaskclusterError {
    /// The queue has no such artifact (HTTP 404).
    #[error("Artifact {name} of task {task_id} not found")]
    ArtifactNotFound { task_id: String, name: String },

    /// A service answered with an error status.
    #[error("Taskcluster request to {url} failed with status {status}: {message}")]
    Api {
        url: String,
        status: u16,
        message: String,
    },

    /// The request could not be sent or its body read.
    #[error("Taskcluster request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The response did not have the expected shape.
    #[error("Invalid Taskcluster response: {0}")]
    InvalidResponse(String),

    /// Hawk credentials were rejected.
    #[error("Hawk authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The operation needs credentials that are not configured.
    #[error("Taskcluster credentials are not configured")]
    MissingCredentials,
}

impl TaskclusterError {
    /// HTTP status the service answered with, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TaskclusterError::ArtifactNotFound { .. } => Some(404),
            TaskclusterError::Api { status, .. } => Some(*status),
            TaskclusterError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type for Taskcluster calls.
pub type TaskclusterResult<T> = std::result::Result<T, TaskclusterError>;

/// A task of a task group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupTask {
    pub task_id: String,
    /// unscheduled, pending, running, completed, failed or exception.
    pub state: String,
    /// `tags.kind` of the task definition.
    pub kind: Option<String>,
}

/// A request carrying a Hawk `Authorization` header, as the auth service
/// validates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HawkRequest {
    /// Path and query of the request.
    pub resource: String,
    /// Lowercase HTTP method.
    pub method: String,
    pub host: String,
    pub port: u16,
    pub authorization: String,
}

/// Identity of a validated Hawk request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HawkIdentity {
    pub client_id: String,
    pub scopes: Vec<String>,
}

/// Taskcluster operations used by shipit.
#[async_trait]
pub trait Taskcluster: Send + Sync {
    /// Root URL of the deployment.
    fn root_url(&self) -> &str;

    /// Client id of the configured credentials; empty without credentials.
    fn client_id(&self) -> &str;

    /// URL of the latest version of a task artifact.
    fn artifact_url(&self, task_id: &str, name: &str) -> String;

    /// Task id indexed at `route`.
    async fn find_task(&self, route: &str) -> TaskclusterResult<String>;

    /// Latest version of an artifact, parsed as YAML (JSON parses too).
    async fn get_latest_artifact(&self, task_id: &str, name: &str) -> TaskclusterResult<Value>;

    /// Current state of a task.
    async fn task_state(&self, task_id: &str) -> TaskclusterResult<String>;

    /// Every task of a task group.
    async fn list_task_group(&self, task_group_id: &str) -> TaskclusterResult<Vec<GroupTask>>;

    /// Names of a task's latest artifacts.
    async fn list_latest_artifacts(&self, task_id: &str) -> TaskclusterResult<Vec<String>>;

    /// Cancel every unfinished task of a group.
    async fn cancel_task_group(&self, task_group_id: &str) -> TaskclusterResult<()>;

    /// Trigger a hook; returns the id of the created task.
    async fn trigger_hook(
        &self,
        hook_group_id: &str,
        hook_id: &str,
        payload: &Value,
    ) -> TaskclusterResult<String>;

    /// Post a Matrix message to a room.
    async fn send_matrix(&self, room_id: &str, body: &str) -> TaskclusterResult<()>;

    /// Validate a Hawk-signed request.
    async fn authenticate_hawk(&self, request: &HawkRequest) -> TaskclusterResult<HawkIdentity>;
}
