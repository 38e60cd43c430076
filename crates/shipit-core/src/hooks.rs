// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Action hooks: selecting release-promotion flavors from a decision task's
//! `actions.json` and rendering the hook payload for a phase.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};
use crate::flavors::{Flavor, extract_our_flavors};

/// Name of the action that schedules release phases.
pub const RELEASE_PROMOTION_ACTION: &str = "release-promotion";

/// Parameters removed from rendered payloads to stay under the hook size limit.
pub const DELETED_PARAMETERS: &[&str] = &["existing_tasks"];

/// The hook a phase triggers, without its render context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionHook {
    pub hook_group_id: String,
    pub hook_id: String,
    pub hook_payload: Value,
}

/// An action hook together with the context its payload is rendered against.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedHook {
    pub hook: ActionHook,
    pub context: Map<String, Value>,
}

/// Find an action by name in `actions.json`.
pub fn find_action<'a>(name: &str, actions: &'a Value) -> Option<&'a Value> {
    actions
        .get("actions")?
        .as_array()?
        .iter()
        .find(|action| action.get("name").and_then(Value::as_str) == Some(name))
}

fn release_promotion(actions: &Value) -> Result<&Value> {
    find_action(RELEASE_PROMOTION_ACTION, actions).ok_or_else(|| {
        Error::UnsupportedFlavor(format!("No {} action found", RELEASE_PROMOTION_ACTION))
    })
}

/// Flavors advertised by the `release-promotion` action.
pub fn available_flavors(actions: &Value) -> Result<Vec<String>> {
    let flavors = release_promotion(actions)?
        .pointer("/schema/properties/release_promotion_flavor/enum")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::UnsupportedFlavor("release_promotion_flavor enum missing".into()))?;
    Ok(flavors
        .iter()
        .filter_map(Value::as_str)
        .map(String::from)
        .collect())
}

/// Release identity used to pick flavors.
#[derive(Debug, Clone, Copy)]
pub struct FlavorQuery<'a> {
    pub product: &'a str,
    pub version: &'a str,
    pub partial_updates: Option<&'a [String]>,
    pub product_key: Option<&'a str>,
}

/// Flavors of a release.
///
/// With `verify` off (XPI releases) every advertised flavor is used and feeds
/// `previous_graph_ids`.
pub fn release_promotion_flavors(
    query: &FlavorQuery<'_>,
    actions: &Value,
    verify: bool,
) -> Result<Vec<Flavor>> {
    let available = available_flavors(actions)?;
    if verify {
        extract_our_flavors(
            &available,
            query.product,
            query.version,
            query.partial_updates,
            query.product_key,
        )
    } else {
        Ok(available
            .iter()
            .map(|name| Flavor::new(name, true))
            .collect())
    }
}

/// Build the hook and context of an action.
pub fn generate_action_hook(
    task_group_id: &str,
    action_name: &str,
    actions: &Value,
    parameters: &Value,
    input: Value,
) -> Result<GeneratedHook> {
    let action = find_action(action_name, actions)
        .ok_or_else(|| Error::NotFound(format!("Action {} not found", action_name)))?;
    let field = |name: &str| -> Result<String> {
        action
            .get(name)
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| Error::NotFound(format!("Action {} has no {}", action_name, name)))
    };

    let mut context = Map::new();
    context.insert("parameters".into(), parameters.clone());
    context.insert("taskGroupId".into(), json!(task_group_id));
    context.insert("taskId".into(), Value::Null);
    context.insert("task".into(), Value::Null);
    context.insert("input".into(), input);

    Ok(GeneratedHook {
        hook: ActionHook {
            hook_group_id: field("hookGroupId")?,
            hook_id: field("hookId")?,
            hook_payload: action.get("hookPayload").cloned().unwrap_or(Value::Null),
        },
        context,
    })
}

/// Render a hook payload and drop bulky decision parameters.
pub fn render_action_hook(
    payload: &Value,
    context: &Map<String, Value>,
    delete_params: &[&str],
) -> Result<Value> {
    let mut rendered = json_e::render(payload, &Value::Object(context.clone()))
        .map_err(|e| Error::Render(e.to_string()))?;
    if let Some(Value::Object(parameters)) = rendered.pointer_mut("/decision/parameters") {
        for param in delete_params {
            parameters.remove(*param);
        }
    }
    Ok(rendered)
}

/// Replace phase names in `previous_graph_ids` with their task ids.
///
/// The first entry is the decision task id. Phases that were skipped have an
/// empty task id and are dropped.
pub fn resolve_previous_graph_ids(
    ids: &[String],
    phase_task_ids: &HashMap<String, String>,
) -> Result<Vec<String>> {
    let Some((decision_task_id, remaining)) = ids.split_first() else {
        return Ok(Vec::new());
    };
    let mut resolved = vec![decision_task_id.clone()];
    for phase_name in remaining {
        let task_id = phase_task_ids
            .get(phase_name)
            .ok_or_else(|| Error::NotFound(format!("Unknown phase {}", phase_name)))?;
        resolved.push(task_id.clone());
    }
    resolved.retain(|id| !id.is_empty());
    Ok(resolved)
}

/// Render the payload a phase submits to its hook.
pub fn rendered_hook_payload(
    hook: &ActionHook,
    mut context: Map<String, Value>,
    phase_task_ids: &HashMap<String, String>,
    extra_context: Option<Map<String, Value>>,
    additional_shipit_emails: &[String],
) -> Result<Value> {
    let input = context
        .get_mut("input")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| Error::Render("hook context has no input".into()))?;

    let ids: Vec<String> = input
        .get("previous_graph_ids")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_str).map(String::from).collect())
        .unwrap_or_default();
    let resolved = resolve_previous_graph_ids(&ids, phase_task_ids)?;
    input.insert("previous_graph_ids".into(), json!(resolved));

    if !additional_shipit_emails.is_empty() {
        input.insert("additional_shipit_emails".into(), json!(additional_shipit_emails));
    }

    if let Some(extra) = extra_context {
        context.extend(extra);
    }
    render_action_hook(&hook.hook_payload, &context, &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actions() -> Value {
        json!({
            "actions": [
                {"name": "retrigger", "hookGroupId": "g", "hookId": "retrigger"},
                {
                    "name": "release-promotion",
                    "hookGroupId": "project-releng",
                    "hookId": "in-tree-action-3-release-promotion/abc",
                    "hookPayload": {
                        "decision": {
                            "parameters": {"$eval": "parameters"},
                            "action": {"taskGroupId": "${taskGroupId}"}
                        },
                        "user": {"input": {"$eval": "input"}}
                    },
                    "schema": {"properties": {"release_promotion_flavor": {
                        "enum": ["promote_firefox", "push_firefox", "ship_firefox", "promote_firefox_rc"]
                    }}}
                }
            ]
        })
    }

    #[test]
    fn test_find_action() {
        let actions = actions();
        assert!(find_action("retrigger", &actions).is_some());
        assert!(find_action("missing", &actions).is_none());
        assert!(find_action("x", &json!({})).is_none());
    }

    #[test]
    fn test_release_promotion_flavors() {
        let actions = actions();
        let query = FlavorQuery {
            product: "firefox",
            version: "100.0.1",
            partial_updates: None,
            product_key: None,
        };
        let verified = release_promotion_flavors(&query, &actions, true).unwrap();
        assert_eq!(verified.len(), 3);
        let unverified = release_promotion_flavors(&query, &actions, false).unwrap();
        assert_eq!(unverified.len(), 4);
        assert!(unverified.iter().all(|f| f.in_previous_graph_ids));
    }

    #[test]
    fn test_generate_and_render_action_hook() {
        let actions = actions();
        let parameters = json!({"project": "mozilla-release", "existing_tasks": {"a": "b"}});
        let generated = generate_action_hook(
            "decision",
            RELEASE_PROMOTION_ACTION,
            &actions,
            &parameters,
            json!({"build_number": 2}),
        )
        .unwrap();
        assert_eq!(generated.hook.hook_group_id, "project-releng");
        assert_eq!(generated.context["taskId"], Value::Null);
        assert_eq!(generated.context["taskGroupId"], json!("decision"));

        let rendered =
            render_action_hook(&generated.hook.hook_payload, &generated.context, DELETED_PARAMETERS)
                .unwrap();
        assert_eq!(rendered["decision"]["action"]["taskGroupId"], json!("decision"));
        assert!(rendered["decision"]["parameters"].get("existing_tasks").is_none());
        assert_eq!(rendered["decision"]["parameters"]["project"], json!("mozilla-release"));
    }

    #[test]
    fn test_render_template_operators() {
        let mut context = Map::new();
        context.insert("parameters".into(), json!({"project": "mozilla-beta"}));
        context.insert("input".into(), json!({"build_number": 3}));
        let payload = json!({
            "decision": {
                "parameters": {"$eval": "parameters"},
                "name": "${parameters.project}-build",
                "beta": {"$if": "parameters.project == 'mozilla-beta'", "then": true, "else": false},
                "release": {"$if": "parameters.project == 'mozilla-release'", "then": true}
            },
            "user": {"$let": {"n": {"$eval": "input.build_number"}}, "in": {"next": {"$eval": "n + 1"}}}
        });
        let rendered = render_action_hook(&payload, &context, &[]).unwrap();
        assert_eq!(rendered["decision"]["name"], json!("mozilla-beta-build"));
        assert_eq!(rendered["decision"]["beta"], json!(true));
        assert!(rendered["decision"].get("release").is_none());
        assert_eq!(rendered["user"]["next"].as_f64(), Some(4.0));
    }

    #[test]
    fn test_render_errors() {
        let context = Map::new();
        let err = render_action_hook(&json!({"$eval": "missing.value"}), &context, &[]).unwrap_err();
        assert!(matches!(err, Error::Render(_)));
        assert!(render_action_hook(&json!({"$frobnicate": [1]}), &context, &[]).is_err());
    }

    #[test]
    fn test_resolve_previous_graph_ids() {
        let phases: HashMap<String, String> = [
            ("promote_firefox".to_string(), "t1".to_string()),
            ("push_firefox".to_string(), String::new()),
        ]
        .into_iter()
        .collect();
        let ids = vec![
            "decision".to_string(),
            "promote_firefox".to_string(),
            "push_firefox".to_string(),
        ];
        assert_eq!(
            resolve_previous_graph_ids(&ids, &phases).unwrap(),
            vec!["decision".to_string(), "t1".to_string()]
        );
        assert!(resolve_previous_graph_ids(&["d".into(), "nope".into()], &phases).is_err());
        assert!(resolve_previous_graph_ids(&[], &phases).unwrap().is_empty());
    }

    #[test]
    fn test_rendered_hook_payload() {
        let actions = actions();
        let generated = generate_action_hook(
            "decision",
            RELEASE_PROMOTION_ACTION,
            &actions,
            &json!({}),
            json!({"previous_graph_ids": ["decision", "promote_firefox"]}),
        )
        .unwrap();
        let phases: HashMap<String, String> =
            [("promote_firefox".to_string(), "t1".to_string())].into_iter().collect();
        let mut extra = Map::new();
        extra.insert("taskGroupId".into(), json!("other"));

        let payload = rendered_hook_payload(
            &generated.hook,
            generated.context,
            &phases,
            Some(extra),
            &["someone@mozilla.com".to_string()],
        )
        .unwrap();
        assert_eq!(payload["user"]["input"]["previous_graph_ids"], json!(["decision", "t1"]));
        assert_eq!(
            payload["user"]["input"]["additional_shipit_emails"],
            json!(["someone@mozilla.com"])
        );
        assert_eq!(payload["decision"]["action"]["taskGroupId"], json!("other"));
    }
}
