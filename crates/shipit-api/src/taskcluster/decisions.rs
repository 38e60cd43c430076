// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Decision task lookups and phase generation.
//!
//! A release's phases are built from the decision task of its revision: the
//! `release-promotion` action in `public/actions.json` and the graph
//! parameters in `public/parameters.yml`. Decision task ids, actions and
//! parameters never change for a given key, so they are memoized.

use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use shipit_core::flavors::SignoffRequirement;
use shipit_core::hooks::{
    FlavorQuery, RELEASE_PROMOTION_ACTION, generate_action_hook, release_promotion_flavors,
};
use shipit_core::repo::decision_task_route;

use super::{Taskcluster, TaskclusterResult};
use crate::db::NewPhase;
use crate::error::{Error, Result};

/// Memoized entries per cache before the cache is reset.
const CACHE_CAPACITY: usize = 2048;

/// Kind of the tasks that produce signed add-ons.
const SIGNING_KIND: &str = "release-signing";

/// Where a release's phases come from.
#[derive(Debug, Clone, Copy)]
pub struct PhaseSource<'a> {
    /// Repository URL; empty for Mercurial and XPI manifest releases.
    pub repo_url: &'a str,
    pub project: &'a str,
    pub revision: &'a str,
    pub flavors: FlavorQuery<'a>,
    /// Restrict to the flavors the product supports (off for XPIs).
    pub verify: bool,
    /// Action input shared by every phase.
    pub common_input: &'a Map<String, Value>,
}

struct Memo<K, V> {
    entries: Mutex<HashMap<K, V>>,
}

impl<K: Eq + Hash, V: Clone> Memo<K, V> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    async fn get(&self, key: &K) -> Option<V> {
        self.entries.lock().await.get(key).cloned()
    }

    async fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.lock().await;
        if entries.len() >= CACHE_CAPACITY {
            entries.clear();
        }
        entries.insert(key, value);
    }
}

/// Decision task helper over a [`Taskcluster`] client.
pub struct Decisions {
    tc: Arc<dyn Taskcluster>,
    decision_ids: Memo<String, String>,
    actions: Memo<String, Value>,
    parameters: Memo<String, Value>,
}

impl Decisions {
    pub fn new(tc: Arc<dyn Taskcluster>) -> Self {
        Self {
            tc,
            decision_ids: Memo::new(),
            actions: Memo::new(),
            parameters: Memo::new(),
        }
    }

    pub fn taskcluster(&self) -> &Arc<dyn Taskcluster> {
        &self.tc
    }

    /// Decision task of a revision, looked up in the index.
    pub async fn find_decision_task_id(
        &self,
        repo_url: &str,
        project: &str,
        revision: &str,
    ) -> Result<String> {
        let route = decision_task_route(repo_url, project, revision)?;
        if let Some(task_id) = self.decision_ids.get(&route).await {
            return Ok(task_id);
        }

        let task_id = self.tc.find_task(&route).await.map_err(|e| {
            warn!(route = %route, error = %e, "Decision task lookup failed");
            Error::BadRequest(format!("route {} exception {}", route, e))
        })?;
        debug!(route = %route, task_id = %task_id, "Found decision task");
        self.decision_ids.insert(route, task_id.clone()).await;
        Ok(task_id)
    }

    /// `public/actions.json` of a decision task.
    pub async fn get_actions(&self, decision_task_id: &str) -> TaskclusterResult<Value> {
        self.memoized_artifact(&self.actions, decision_task_id, "public/actions.json")
            .await
    }

    /// `public/parameters.yml` of a decision task.
    pub async fn get_parameters(&self, decision_task_id: &str) -> TaskclusterResult<Value> {
        self.memoized_artifact(&self.parameters, decision_task_id, "public/parameters.yml")
            .await
    }

    async fn memoized_artifact(
        &self,
        memo: &Memo<String, Value>,
        task_id: &str,
        name: &str,
    ) -> TaskclusterResult<Value> {
        let key = task_id.to_string();
        if let Some(value) = memo.get(&key).await {
            return Ok(value);
        }
        let value = self.tc.get_latest_artifact(task_id, name).await?;
        memo.insert(key, value.clone()).await;
        Ok(value)
    }

    /// Build the phases of a release, one per release-promotion flavor.
    ///
    /// Each phase's `previous_graph_ids` lists the decision task followed by
    /// the names of earlier phases feeding the graph; names are replaced
    /// with task ids when the phase is scheduled.
    pub async fn generate_phases<F>(
        &self,
        source: &PhaseSource<'_>,
        signoffs: F,
    ) -> Result<Vec<NewPhase>>
    where
        F: Fn(&str) -> Vec<SignoffRequirement>,
    {
        let decision_task_id = self
            .find_decision_task_id(source.repo_url, source.project, source.revision)
            .await?;
        let actions = self.get_actions(&decision_task_id).await?;
        let parameters = self.get_parameters(&decision_task_id).await?;

        let mut previous_graph_ids = vec![decision_task_id.clone()];
        let mut phases = Vec::new();

        for flavor in release_promotion_flavors(&source.flavors, &actions, source.verify)? {
            let mut input = source.common_input.clone();
            input.insert("release_promotion_flavor".into(), json!(flavor.name));
            input.insert("previous_graph_ids".into(), json!(previous_graph_ids));

            let hook = generate_action_hook(
                &decision_task_id,
                RELEASE_PROMOTION_ACTION,
                &actions,
                &parameters,
                Value::Object(input),
            )?;

            if flavor.in_previous_graph_ids {
                previous_graph_ids.push(flavor.name.clone());
            }

            phases.push(NewPhase {
                signoffs: signoffs(&flavor.name),
                name: flavor.name,
                task: serde_json::to_value(&hook.hook)?,
                context: Value::Object(hook.context),
            });
        }
        Ok(phases)
    }

    /// URL of the signed `.xpi` produced by a phase's action task group, or
    /// an empty string when there is none yet.
    pub async fn generate_xpi_url(&self, task_id: &str) -> String {
        match self.find_signed_xpi(task_id).await {
            Ok(Some(url)) => url,
            Ok(None) => String::new(),
            Err(e) => {
                debug!(task_id = %task_id, error = %e, "No signed XPI");
                String::new()
            }
        }
    }

    async fn find_signed_xpi(&self, task_id: &str) -> TaskclusterResult<Option<String>> {
        let tasks = self.tc.list_task_group(task_id).await?;
        let Some(signing) = tasks
            .iter()
            .find(|t| t.state == "completed" && t.kind.as_deref() == Some(SIGNING_KIND))
        else {
            return Ok(None);
        };

        let artifacts = self.tc.list_latest_artifacts(&signing.task_id).await?;
        Ok(artifacts
            .iter()
            .find(|name| name.ends_with(".xpi"))
            .map(|name| self.tc.artifact_url(&signing.task_id, name)))
    }
}
