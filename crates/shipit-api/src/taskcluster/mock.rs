// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock Taskcluster for testing.
//!
//! Index routes, artifacts, task states and task groups are seeded by the
//! test; triggered hooks, canceled groups and Matrix messages are recorded.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use super::{
    GroupTask, HawkIdentity, HawkRequest, Taskcluster, TaskclusterError, TaskclusterResult,
};

/// A recorded `trigger_hook` call.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggeredHook {
    pub hook_group_id: String,
    pub hook_id: String,
    pub payload: Value,
    pub task_id: String,
}

#[derive(Debug, Default)]
struct MockState {
    index: HashMap<String, String>,
    artifacts: HashMap<(String, String), Value>,
    task_states: HashMap<String, String>,
    task_groups: HashMap<String, Vec<GroupTask>>,
    hawk_clients: HashMap<String, HawkIdentity>,
    triggered: Vec<TriggeredHook>,
    canceled_groups: Vec<String>,
    matrix_messages: Vec<(String, String)>,
}

/// In-memory Taskcluster.
pub struct MockTaskcluster {
    state: Mutex<MockState>,
    next_task: AtomicU64,
    /// If true, hook triggers fail with a 500.
    pub fail_triggers: bool,
    /// If true, Matrix messages fail with a 500.
    pub fail_notify: bool,
}

impl Default for MockTaskcluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTaskcluster {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            next_task: AtomicU64::new(1),
            fail_triggers: false,
            fail_notify: false,
        }
    }

    /// A mock whose hook triggers always fail.
    pub fn failing_triggers() -> Self {
        Self {
            fail_triggers: true,
            ..Self::new()
        }
    }

    /// A mock whose Matrix messages always fail.
    pub fn failing_notify() -> Self {
        Self {
            fail_notify: true,
            ..Self::new()
        }
    }

    pub async fn index_task(&self, route: &str, task_id: &str) {
        self.state
            .lock()
            .await
            .index
            .insert(route.to_string(), task_id.to_string());
    }

    pub async fn add_artifact(&self, task_id: &str, name: &str, content: Value) {
        self.state
            .lock()
            .await
            .artifacts
            .insert((task_id.to_string(), name.to_string()), content);
    }

    pub async fn set_task_state(&self, task_id: &str, state: &str) {
        self.state
            .lock()
            .await
            .task_states
            .insert(task_id.to_string(), state.to_string());
    }

    pub async fn set_task_group(&self, task_group_id: &str, tasks: Vec<GroupTask>) {
        self.state
            .lock()
            .await
            .task_groups
            .insert(task_group_id.to_string(), tasks);
    }

    /// Accept Hawk requests carrying `authorization`.
    pub async fn add_hawk_client(&self, authorization: &str, client_id: &str, scopes: &[&str]) {
        self.state.lock().await.hawk_clients.insert(
            authorization.to_string(),
            HawkIdentity {
                client_id: client_id.to_string(),
                scopes: scopes.iter().map(|s| s.to_string()).collect(),
            },
        );
    }

    pub async fn triggered_hooks(&self) -> Vec<TriggeredHook> {
        self.state.lock().await.triggered.clone()
    }

    pub async fn canceled_groups(&self) -> Vec<String> {
        self.state.lock().await.canceled_groups.clone()
    }

    pub async fn matrix_messages(&self) -> Vec<(String, String)> {
        self.state.lock().await.matrix_messages.clone()
    }

    fn new_task_id(&self) -> String {
        format!("task-{}", self.next_task.fetch_add(1, Ordering::SeqCst))
    }
}

fn server_error(url: &str) -> TaskclusterError {
    TaskclusterError::Api {
        url: url.to_string(),
        status: 500,
        message: "Internal Server Error".into(),
    }
}

fn not_found(url: String) -> TaskclusterError {
    TaskclusterError::Api {
        url,
        status: 404,
        message: "Resource not found".into(),
    }
}

#[async_trait]
impl Taskcluster for MockTaskcluster {
    fn root_url(&self) -> &str {
        "https://tc.mock"
    }

    fn client_id(&self) -> &str {
        "mock-client"
    }

    fn artifact_url(&self, task_id: &str, name: &str) -> String {
        format!(
            "https://tc.mock/api/queue/v1/task/{}/artifacts/{}",
            task_id,
            urlencoding::encode(name)
        )
    }

    async fn find_task(&self, route: &str) -> TaskclusterResult<String> {
        self.state
            .lock()
            .await
            .index
            .get(route)
            .cloned()
            .ok_or_else(|| not_found(format!("index/{}", route)))
    }

    async fn get_latest_artifact(&self, task_id: &str, name: &str) -> TaskclusterResult<Value> {
        self.state
            .lock()
            .await
            .artifacts
            .get(&(task_id.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| TaskclusterError::ArtifactNotFound {
                task_id: task_id.to_string(),
                name: name.to_string(),
            })
    }

    async fn task_state(&self, task_id: &str) -> TaskclusterResult<String> {
        self.state
            .lock()
            .await
            .task_states
            .get(task_id)
            .cloned()
            .ok_or_else(|| not_found(format!("task/{}/status", task_id)))
    }

    async fn list_task_group(&self, task_group_id: &str) -> TaskclusterResult<Vec<GroupTask>> {
        self.state
            .lock()
            .await
            .task_groups
            .get(task_group_id)
            .cloned()
            .ok_or_else(|| not_found(format!("task-group/{}/list", task_group_id)))
    }

    async fn list_latest_artifacts(&self, task_id: &str) -> TaskclusterResult<Vec<String>> {
        Ok(self
            .state
            .lock()
            .await
            .artifacts
            .keys()
            .filter(|(task, _)| task == task_id)
            .map(|(_, name)| name.clone())
            .collect())
    }

    async fn cancel_task_group(&self, task_group_id: &str) -> TaskclusterResult<()> {
        self.state
            .lock()
            .await
            .canceled_groups
            .push(task_group_id.to_string());
        Ok(())
    }

    async fn trigger_hook(
        &self,
        hook_group_id: &str,
        hook_id: &str,
        payload: &Value,
    ) -> TaskclusterResult<String> {
        if self.fail_triggers {
            return Err(server_error("hooks/trigger"));
        }
        let task_id = self.new_task_id();
        self.state.lock().await.triggered.push(TriggeredHook {
            hook_group_id: hook_group_id.to_string(),
            hook_id: hook_id.to_string(),
            payload: payload.clone(),
            task_id: task_id.clone(),
        });
        Ok(task_id)
    }

    async fn send_matrix(&self, room_id: &str, body: &str) -> TaskclusterResult<()> {
        if self.fail_notify {
            return Err(server_error("notify/matrix"));
        }
        self.state
            .lock()
            .await
            .matrix_messages
            .push((room_id.to_string(), body.to_string()));
        Ok(())
    }

    async fn authenticate_hawk(&self, request: &HawkRequest) -> TaskclusterResult<HawkIdentity> {
        self.state
            .lock()
            .await
            .hawk_clients
            .get(&request.authorization)
            .cloned()
            .ok_or_else(|| TaskclusterError::AuthenticationFailed("Unknown client".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_artifacts_and_index() {
        let tc = MockTaskcluster::new();
        tc.index_task("gecko.v2.try.revision.abc.taskgraph.decision", "decision")
            .await;
        tc.add_artifact("decision", "public/actions.json", json!({"actions": []}))
            .await;

        assert_eq!(
            tc.find_task("gecko.v2.try.revision.abc.taskgraph.decision")
                .await
                .unwrap(),
            "decision"
        );
        assert!(tc.find_task("missing").await.is_err());
        assert_eq!(
            tc.list_latest_artifacts("decision").await.unwrap(),
            vec!["public/actions.json".to_string()]
        );
        assert!(matches!(
            tc.get_latest_artifact("decision", "public/parameters.yml").await,
            Err(TaskclusterError::ArtifactNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_trigger_hook_records_calls() {
        let tc = MockTaskcluster::new();
        let first = tc.trigger_hook("g", "h", &json!({"a": 1})).await.unwrap();
        let second = tc.trigger_hook("g", "h", &json!({"a": 2})).await.unwrap();
        assert_ne!(first, second);

        let triggered = tc.triggered_hooks().await;
        assert_eq!(triggered.len(), 2);
        assert_eq!(triggered[1].payload, json!({"a": 2}));

        let failing = MockTaskcluster::failing_triggers();
        assert!(failing.trigger_hook("g", "h", &json!({})).await.is_err());
    }
}
