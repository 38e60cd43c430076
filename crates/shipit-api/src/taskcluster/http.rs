// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Taskcluster REST client.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use super::hawk::{self, Credentials, SignedRequest};
use super::{
    GroupTask, HawkIdentity, HawkRequest, Taskcluster, TaskclusterError, TaskclusterResult,
};
use crate::config::TaskclusterConfig;

/// Taskcluster client over reqwest; requests are Hawk-signed when
/// credentials are configured.
pub struct TaskclusterClient {
    root_url: String,
    credentials: Option<Credentials>,
    http_client: reqwest::Client,
}

impl TaskclusterClient {
    pub fn new(config: &TaskclusterConfig) -> Self {
        let credentials = match (&config.client_id, &config.access_token) {
            (Some(client_id), Some(access_token)) => Some(Credentials {
                client_id: client_id.clone(),
                access_token: access_token.clone(),
            }),
            _ => None,
        };
        Self {
            root_url: config.root_url.trim_end_matches('/').to_string(),
            credentials,
            http_client: reqwest::Client::new(),
        }
    }

    fn service_url(&self, service: &str, path: &str) -> String {
        format!("{}/api/{}/v1/{}", self.root_url, service, path)
    }

    fn request(&self, method: Method, url: &str) -> TaskclusterResult<RequestBuilder> {
        let builder = self.http_client.request(method.clone(), url);
        let Some(credentials) = &self.credentials else {
            return Ok(builder);
        };

        let parsed =
            Url::parse(url).map_err(|e| TaskclusterError::InvalidResponse(e.to_string()))?;
        let resource = match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        };
        let request = SignedRequest {
            method: method.as_str(),
            resource: &resource,
            host: parsed.host_str().unwrap_or_default(),
            port: parsed.port_or_known_default().unwrap_or(443),
        };
        let header = hawk::authorization_header(
            credentials,
            &request,
            Utc::now().timestamp(),
            &hawk::generate_nonce(),
            None,
        );
        Ok(builder.header(reqwest::header::AUTHORIZATION, header))
    }

    async fn send(&self, builder: RequestBuilder) -> TaskclusterResult<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
            .unwrap_or(body);
        Err(TaskclusterError::Api {
            url,
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json(&self, url: &str) -> TaskclusterResult<Value> {
        let builder = self.request(Method::GET, url)?;
        Ok(self.send(builder).await?.json().await?)
    }

    async fn post_json(&self, url: &str, body: &Value) -> TaskclusterResult<Value> {
        let builder = self.request(Method::POST, url)?.json(body);
        let response = self.send(builder).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| TaskclusterError::InvalidResponse(e.to_string()))
    }
}

fn string_at(value: &Value, pointer: &str) -> TaskclusterResult<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| TaskclusterError::InvalidResponse(format!("missing {}", pointer)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskGroupPage {
    #[serde(default)]
    tasks: Vec<TaskGroupEntry>,
    continuation_token: Option<String>,
}

#[derive(Deserialize)]
struct TaskGroupEntry {
    status: TaskGroupStatus,
    #[serde(default)]
    task: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskGroupStatus {
    task_id: String,
    state: String,
}

#[derive(Deserialize)]
struct ArtifactList {
    #[serde(default)]
    artifacts: Vec<ArtifactEntry>,
}

#[derive(Deserialize)]
struct ArtifactEntry {
    name: String,
}

#[async_trait]
impl Taskcluster for TaskclusterClient {
    fn root_url(&self) -> &str {
        &self.root_url
    }

    fn client_id(&self) -> &str {
        self.credentials
            .as_ref()
            .map(|c| c.client_id.as_str())
            .unwrap_or_default()
    }

    fn artifact_url(&self, task_id: &str, name: &str) -> String {
        self.service_url(
            "queue",
            &format!("task/{}/artifacts/{}", task_id, urlencoding::encode(name)),
        )
    }

    async fn find_task(&self, route: &str) -> TaskclusterResult<String> {
        let url = self.service_url("index", &format!("task/{}", route));
        let body = self.get_json(&url).await?;
        string_at(&body, "/taskId")
    }

    async fn get_latest_artifact(&self, task_id: &str, name: &str) -> TaskclusterResult<Value> {
        let url = self.artifact_url(task_id, name);
        debug!(task_id = %task_id, artifact = %name, "Fetching artifact");
        // Artifacts are public; the queue redirects to the storage backend
        let response = self.http_client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(TaskclusterError::ArtifactNotFound {
                task_id: task_id.to_string(),
                name: name.to_string(),
            });
        }
        let response = response.error_for_status()?;
        let text = response.text().await?;
        serde_yaml::from_str(&text).map_err(|e| TaskclusterError::InvalidResponse(e.to_string()))
    }

    async fn task_state(&self, task_id: &str) -> TaskclusterResult<String> {
        let url = self.service_url("queue", &format!("task/{}/status", task_id));
        let body = self.get_json(&url).await?;
        string_at(&body, "/status/state")
    }

    async fn list_task_group(&self, task_group_id: &str) -> TaskclusterResult<Vec<GroupTask>> {
        let base = self.service_url("queue", &format!("task-group/{}/list", task_group_id));
        let mut tasks = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let url = match &continuation {
                Some(token) => format!("{}?continuationToken={}", base, urlencoding::encode(token)),
                None => base.clone(),
            };
            let page: TaskGroupPage = serde_json::from_value(self.get_json(&url).await?)
                .map_err(|e| TaskclusterError::InvalidResponse(e.to_string()))?;

            tasks.extend(page.tasks.into_iter().map(|entry| GroupTask {
                task_id: entry.status.task_id,
                state: entry.status.state,
                kind: entry
                    .task
                    .pointer("/tags/kind")
                    .and_then(Value::as_str)
                    .map(String::from),
            }));

            match page.continuation_token {
                Some(token) if !token.is_empty() => continuation = Some(token),
                _ => break,
            }
        }
        Ok(tasks)
    }

    async fn list_latest_artifacts(&self, task_id: &str) -> TaskclusterResult<Vec<String>> {
        let url = self.service_url("queue", &format!("task/{}/artifacts", task_id));
        let list: ArtifactList = serde_json::from_value(self.get_json(&url).await?)
            .map_err(|e| TaskclusterError::InvalidResponse(e.to_string()))?;
        Ok(list.artifacts.into_iter().map(|a| a.name).collect())
    }

    async fn cancel_task_group(&self, task_group_id: &str) -> TaskclusterResult<()> {
        if self.credentials.is_none() {
            return Err(TaskclusterError::MissingCredentials);
        }
        let url = self.service_url("queue", &format!("task-group/{}/cancel", task_group_id));
        self.post_json(&url, &json!({})).await?;
        Ok(())
    }

    async fn trigger_hook(
        &self,
        hook_group_id: &str,
        hook_id: &str,
        payload: &Value,
    ) -> TaskclusterResult<String> {
        if self.credentials.is_none() {
            return Err(TaskclusterError::MissingCredentials);
        }
        let url = self.service_url(
            "hooks",
            &format!(
                "hooks/{}/{}/trigger",
                urlencoding::encode(hook_group_id),
                urlencoding::encode(hook_id)
            ),
        );
        let body = self.post_json(&url, payload).await?;
        string_at(&body, "/status/taskId")
    }

    async fn send_matrix(&self, room_id: &str, body: &str) -> TaskclusterResult<()> {
        if self.credentials.is_none() {
            return Err(TaskclusterError::MissingCredentials);
        }
        let url = self.service_url("notify", "matrix");
        self.post_json(
            &url,
            &json!({"roomId": room_id, "body": body, "msgtype": "m.text"}),
        )
        .await?;
        Ok(())
    }

    async fn authenticate_hawk(&self, request: &HawkRequest) -> TaskclusterResult<HawkIdentity> {
        let url = self.service_url("auth", "authenticate-hawk");
        let body = self
            .post_json(
                &url,
                &json!({
                    "method": request.method,
                    "resource": request.resource,
                    "host": request.host,
                    "port": request.port,
                    "authorization": request.authorization,
                }),
            )
            .await?;

        let status = body.get("status").and_then(Value::as_str).unwrap_or_default();
        if status != "auth-success" {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or(status)
                .to_string();
            return Err(TaskclusterError::AuthenticationFailed(message));
        }
        Ok(HawkIdentity {
            client_id: string_at(&body, "/clientId")?,
            scopes: body
                .get("scopes")
                .and_then(Value::as_array)
                .map(|s| s.iter().filter_map(Value::as_str).map(String::from).collect())
                .unwrap_or_default(),
        })
    }
}
