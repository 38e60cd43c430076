// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Merge automation behaviors and task statuses.
//!
//! Behaviors are declared once with `by-env` branches and resolved against
//! the deployment channel when looked up.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Action triggered on the decision task to run a merge.
pub const MERGE_AUTOMATION_ACTION: &str = "merge-automation";

/// A resolved merge behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeBehavior {
    pub behavior: String,
    pub pretty_name: String,
    #[serde(rename = "always-target-tip")]
    pub always_target_tip: bool,
    pub repo: String,
    pub project: String,
    pub version_path: String,
}

fn behavior_definitions() -> Value {
    let version_path = "browser/config/version_display.txt";
    let target = |tip: bool, repo: &str, project: &str| {
        json!({
            "always-target-tip": tip,
            "repo": repo,
            "project": project,
            "version_path": version_path,
        })
    };
    json!({
        "firefox": {
            "main-to-beta": {
                "pretty_name": "Main -> beta",
                "by-env": {
                    "local": target(false, "https://hg.mozilla.org/try", "try"),
                    "staging": target(false, "https://hg.mozilla.org/try", "try"),
                    "production": target(true, "https://hg.mozilla.org/mozilla-central", "mozilla-central"),
                }
            },
            "beta-to-release": {
                "pretty_name": "Beta -> release",
                "by-env": {
                    "local": target(true, "https://hg.mozilla.org/releases/mozilla-beta", "mozilla-beta"),
                    "staging": target(false, "https://hg.mozilla.org/try", "try"),
                    "production": target(true, "https://hg.mozilla.org/releases/mozilla-beta", "mozilla-beta"),
                }
            }
        }
    })
}

/// Replace every object holding `by-env` with its other keys merged with the
/// branch selected by `environment`. Non-object branches replace the object.
pub fn resolve_config_by_environment(value: &Value, environment: &str) -> Result<Value> {
    match value {
        Value::Object(map) => {
            if let Some(branches) = map.get("by-env") {
                let selected = branches.get(environment).ok_or_else(|| {
                    Error::NotFound(format!("No by-env value for environment {}", environment))
                })?;
                let selected = resolve_config_by_environment(selected, environment)?;
                let Value::Object(selected) = selected else {
                    return Ok(selected);
                };
                let mut out = Map::new();
                for (key, inner) in map {
                    if key != "by-env" {
                        out.insert(key.clone(), resolve_config_by_environment(inner, environment)?);
                    }
                }
                out.extend(selected);
                return Ok(Value::Object(out));
            }
            let mut out = Map::new();
            for (key, inner) in map {
                out.insert(key.clone(), resolve_config_by_environment(inner, environment)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Map a deployment channel onto the `by-env` keys.
pub fn environment_for_channel(channel: &str) -> &'static str {
    match channel {
        "production" => "production",
        "staging" => "staging",
        _ => "local",
    }
}

/// Products with merge behaviors.
pub fn merge_products() -> Vec<String> {
    behavior_definitions()
        .as_object()
        .map(|products| products.keys().cloned().collect())
        .unwrap_or_default()
}

/// Every behavior of a product, in declaration order.
pub fn behaviors_for(product: &str, environment: &str) -> Result<Vec<MergeBehavior>> {
    let definitions = behavior_definitions();
    let product_behaviors = definitions
        .get(product)
        .and_then(Value::as_object)
        .ok_or_else(|| Error::NotFound(format!("No merge behavior found for product: {}", product)))?;

    let mut behaviors = Vec::with_capacity(product_behaviors.len());
    for (name, definition) in product_behaviors {
        let mut resolved = resolve_config_by_environment(definition, environment)?;
        if let Value::Object(map) = &mut resolved {
            map.insert("behavior".into(), json!(name));
        }
        let behavior = serde_json::from_value(resolved)
            .map_err(|e| Error::NotFound(format!("Invalid merge behavior {}: {}", name, e)))?;
        behaviors.push(behavior);
    }
    Ok(behaviors)
}

/// A single behavior of a product.
pub fn behavior(product: &str, name: &str, environment: &str) -> Result<MergeBehavior> {
    behaviors_for(product, environment)?
        .into_iter()
        .find(|b| b.behavior == name)
        .ok_or_else(|| {
            Error::NotFound(format!("Behavior {} not found for product: {}", name, product))
        })
}

/// Status of a merge automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
        }
    }

    /// Name used in conflict messages (`Cannot start automation in Running status`).
    pub fn display_name(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Running => "Running",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
            TaskStatus::Canceled => "Canceled",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Canceled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "canceled" => Ok(TaskStatus::Canceled),
            other => Err(Error::NotFound(format!("Unknown task status: {}", other))),
        }
    }
}

/// Overall status of a task group from its tasks' Taskcluster states.
pub fn task_group_status<S: AsRef<str>>(states: &[S]) -> TaskStatus {
    let mut status = TaskStatus::Completed;
    for state in states {
        match state.as_ref() {
            "failed" | "exception" => return TaskStatus::Failed,
            "running" | "pending" | "unscheduled" => status = TaskStatus::Running,
            _ => {}
        }
    }
    status
}

/// Input of the `merge-automation` action.
pub fn merge_action_input(behavior: &str, dry_run: bool, automation_id: i32) -> Value {
    json!({
        "behavior": behavior,
        "force-dry-run": dry_run,
        "merge-automation-id": automation_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_config_by_environment() {
        let config = json!({
            "a": {"keep": 1, "by-env": {"local": {"x": "l"}, "production": {"x": "p"}}},
            "b": {"by-env": {"local": 3, "production": 4}},
            "c": [1, 2]
        });
        assert_eq!(
            resolve_config_by_environment(&config, "production").unwrap(),
            json!({"a": {"keep": 1, "x": "p"}, "b": 4, "c": [1, 2]})
        );
        assert_eq!(
            resolve_config_by_environment(&config, "local").unwrap(),
            json!({"a": {"keep": 1, "x": "l"}, "b": 3, "c": [1, 2]})
        );
        assert!(resolve_config_by_environment(&config, "staging").is_err());
    }

    #[test]
    fn test_behaviors_per_environment() {
        let production = behavior("firefox", "main-to-beta", "production").unwrap();
        assert!(production.always_target_tip);
        assert_eq!(production.project, "mozilla-central");
        assert_eq!(production.pretty_name, "Main -> beta");

        let staging = behavior("firefox", "beta-to-release", "staging").unwrap();
        assert_eq!(staging.repo, "https://hg.mozilla.org/try");
        assert!(!staging.always_target_tip);

        assert_eq!(behaviors_for("firefox", "local").unwrap().len(), 2);
        assert_eq!(merge_products(), vec!["firefox".to_string()]);
    }

    #[test]
    fn test_unknown_behavior_messages() {
        let err = behaviors_for("thunderbird", "local").unwrap_err();
        assert_eq!(err.to_string(), "No merge behavior found for product: thunderbird");
        let err = behavior("firefox", "esr-bump", "local").unwrap_err();
        assert_eq!(err.to_string(), "Behavior esr-bump not found for product: firefox");
    }

    #[test]
    fn test_task_group_status() {
        assert_eq!(task_group_status(&["completed", "completed"]), TaskStatus::Completed);
        assert_eq!(task_group_status(&["completed", "running"]), TaskStatus::Running);
        assert_eq!(task_group_status(&["unscheduled", "exception"]), TaskStatus::Failed);
        assert_eq!(task_group_status::<&str>(&[]), TaskStatus::Completed);
    }

    #[test]
    fn test_environment_for_channel() {
        assert_eq!(environment_for_channel("production"), "production");
        assert_eq!(environment_for_channel("staging"), "staging");
        assert_eq!(environment_for_channel("dev"), "local");
    }
}
