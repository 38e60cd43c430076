// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP handlers.
//!
//! Handlers extract the caller as a [`Principal`], check the scope the
//! operation needs, and return JSON. Failures are [`Error`]s rendered as
//! problem documents.

pub mod disabled_products;
pub mod dockerflow;
pub mod github;
pub mod merge_automation;
pub mod permissions;
pub mod product_details;
pub mod releases;
pub mod signoffs;
pub mod versions;
pub mod xpi;

use serde_json::{Map, Value, json};
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

use shipit_core::hooks::{ActionHook, rendered_hook_payload};
use shipit_core::version::parse_version;

use crate::auth::Principal;
use crate::db::{self, Phase, Release, ReleaseKind, Signoff};
use crate::error::{Error, Result};
use crate::state::AppState;

/// Status listed when the caller does not ask for any.
const DEFAULT_STATUS: &str = "scheduled";

/// Taskcluster UI page of a task group.
pub(crate) fn task_group_url(root_url: &str, task_id: &str) -> String {
    format!("{}/tasks/groups/{}", root_url.trim_end_matches('/'), task_id)
}

pub(crate) fn release_not_found(name: &str) -> Error {
    Error::NotFound(format!("Release {} not found", name))
}

/// Pick a phase by name out of a release's phases.
pub(crate) fn find_phase(phases: &[Phase], name: &str) -> Result<Phase> {
    phases
        .iter()
        .find(|phase| phase.name == name)
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("Phase {} not found", name)))
}

pub(crate) async fn get_product_release(state: &AppState, name: &str) -> Result<Release> {
    db::get_release(&state.pool, name)
        .await?
        .ok_or_else(|| release_not_found(name))
}

/// Signoffs of every phase, keyed by phase id.
pub(crate) async fn signoffs_by_phase(
    state: &AppState,
    kind: ReleaseKind,
    phases: &[Phase],
) -> Result<HashMap<i32, Vec<Signoff>>> {
    let mut signoffs = HashMap::new();
    for phase in phases {
        signoffs.insert(
            phase.id,
            db::get_signoffs(&state.pool, kind, phase.id).await?,
        );
    }
    Ok(signoffs)
}

/// Everyone who submitted a phase or signed one off so far.
fn shipit_emails(phases: &[Phase], signoffs: &HashMap<i32, Vec<Signoff>>) -> Vec<String> {
    let mut emails = BTreeSet::new();
    for phase in phases {
        if let Some(who) = &phase.completed_by {
            emails.insert(who.clone());
        }
        for signoff in signoffs.get(&phase.id).into_iter().flatten() {
            if let Some(who) = &signoff.completed_by {
                emails.insert(who.clone());
            }
        }
    }
    emails.into_iter().collect()
}

/// Trigger the hook of a phase and record it as submitted.
///
/// `phases` are all phases of the release in creation order; earlier phases
/// that were never submitted end up skipped. Returns the updated phase.
pub(crate) async fn do_schedule_phase(
    state: &AppState,
    principal: &Principal,
    kind: ReleaseKind,
    phases: &[Phase],
    phase_name: &str,
) -> Result<Phase> {
    let phase = find_phase(phases, phase_name)?;
    if phase.submitted {
        return Err(Error::Conflict("Already submitted!".into()));
    }

    let signoffs = signoffs_by_phase(state, kind, phases).await?;
    if signoffs
        .get(&phase.id)
        .is_some_and(|own| own.iter().any(|s| !s.signed))
    {
        return Err(Error::BadRequest("Pending signoffs".into()));
    }

    let hook: ActionHook = serde_json::from_value(phase.task.clone())?;
    let context = phase
        .context
        .as_object()
        .cloned()
        .ok_or_else(|| Error::Internal(format!("Phase {} has no hook context", phase.name)))?;
    let phase_task_ids: HashMap<String, String> = phases
        .iter()
        .map(|p| (p.name.clone(), p.task_id.clone()))
        .collect();

    let mut extra_context = Map::new();
    extra_context.insert(
        "clientId".into(),
        json!(state.taskcluster.client_id()),
    );
    let payload = rendered_hook_payload(
        &hook,
        context,
        &phase_task_ids,
        Some(extra_context),
        &shipit_emails(phases, &signoffs),
    )?;

    let task_id = state
        .taskcluster
        .trigger_hook(&hook.hook_group_id, &hook.hook_id, &payload)
        .await
        .map_err(|e| {
            warn!(phase = %phase.name, error = %e, "Failed to trigger hook");
            Error::BadRequest(e.to_string())
        })?;

    if !db::mark_phase_submitted(&state.pool, kind, &phase, &task_id, principal.id()).await? {
        return Err(Error::Conflict("Already submitted!".into()));
    }

    let phases = db::get_phases(&state.pool, kind, phase.release_id).await?;
    let scheduled = find_phase(&phases, phase_name)?;
    info!(
        phase = %scheduled.name,
        task_id = %scheduled.task_id,
        user = %principal.id(),
        url = %task_group_url(state.taskcluster.root_url(), &scheduled.task_id),
        "Phase started"
    );
    Ok(scheduled)
}

/// `{"signoffs": [...]}` body of a phase.
pub(crate) fn signoffs_json(signoffs: &[Signoff]) -> Value {
    json!({ "signoffs": signoffs.iter().map(Signoff::to_json).collect::<Vec<_>>() })
}

/// Parse a signoff uid out of a request body: a JSON string or plain text.
pub(crate) fn signoff_uid(body: &str) -> String {
    serde_json::from_str::<String>(body).unwrap_or_else(|_| body.trim().to_string())
}

// ============================================================================
// Listing helpers
// ============================================================================

/// Repeated query parameters (`?status=shipped&status=aborted`).
#[derive(Debug, Default)]
pub(crate) struct ListParams {
    params: Vec<(String, String)>,
}

impl ListParams {
    pub(crate) fn new(params: Vec<(String, String)>) -> Self {
        Self { params }
    }

    pub(crate) fn get(&self, key: &str) -> Option<String> {
        self.params
            .iter()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.clone())
    }

    /// Every status asked for; `scheduled` when none.
    pub(crate) fn statuses(&self) -> Vec<String> {
        let statuses: Vec<String> = self
            .params
            .iter()
            .filter(|(k, _)| k == "status")
            .flat_map(|(_, v)| v.split(','))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if statuses.is_empty() {
            vec![DEFAULT_STATUS.to_string()]
        } else {
            statuses
        }
    }

    /// `build_number` is only meaningful together with a version key.
    pub(crate) fn build_number(&self, version_key: &str) -> Result<Option<i32>> {
        let Some(raw) = self.get("build_number") else {
            return Ok(None);
        };
        if self.get(version_key).is_none() {
            return Err(Error::BadRequest(
                "Filtering by build_number without version is not supported.".into(),
            ));
        }
        raw.parse()
            .map(Some)
            .map_err(|_| Error::BadRequest(format!("Invalid build_number: {}", raw)))
    }
}

/// Group releases by product (alphabetical) and order each group by
/// version. Releases whose version does not parse are dropped.
pub(crate) fn sort_by_product_then_version(releases: Vec<Release>) -> Vec<Release> {
    let mut parsed: Vec<_> = releases
        .into_iter()
        .filter_map(|release| {
            let version = parse_version(&release.product, &release.version).ok()?;
            Some((release.product.clone(), version, release))
        })
        .collect();
    parsed.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    parsed.into_iter().map(|(_, _, release)| release).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn release(product: &str, version: &str) -> Release {
        Release {
            id: 1,
            name: format!("{}-{}-build1", product, version),
            product: product.into(),
            version: version.into(),
            branch: "releases/mozilla-release".into(),
            revision: "abc".into(),
            build_number: 1,
            release_eta: None,
            status: "shipped".into(),
            partial_updates: None,
            product_key: None,
            repo_url: String::new(),
            created: Utc::now(),
            completed: None,
        }
    }

    #[test]
    fn test_sort_by_product_then_version() {
        let sorted = sort_by_product_then_version(vec![
            release("thunderbird", "128.0"),
            release("firefox", "130.0"),
            release("firefox", "2.0.0.1"),
            release("firefox", "129.0.2"),
            release("firefox", "130.0b9"),
        ]);
        let versions: Vec<_> = sorted
            .iter()
            .map(|r| format!("{} {}", r.product, r.version))
            .collect();
        assert_eq!(
            versions,
            vec![
                "firefox 129.0.2",
                "firefox 130.0b9",
                "firefox 130.0",
                "thunderbird 128.0"
            ]
        );
    }

    #[test]
    fn test_list_params() {
        let params = ListParams::new(vec![
            ("status".into(), "shipped".into()),
            ("status".into(), "aborted,scheduled".into()),
            ("product".into(), "firefox".into()),
        ]);
        assert_eq!(params.statuses(), vec!["shipped", "aborted", "scheduled"]);
        assert_eq!(params.get("product").as_deref(), Some("firefox"));
        assert_eq!(ListParams::default().statuses(), vec!["scheduled"]);

        let bad = ListParams::new(vec![("build_number".into(), "2".into())]);
        assert!(matches!(
            bad.build_number("version"),
            Err(Error::BadRequest(_))
        ));
        let good = ListParams::new(vec![
            ("version".into(), "130.0".into()),
            ("build_number".into(), "2".into()),
        ]);
        assert_eq!(good.build_number("version").unwrap(), Some(2));
    }

    #[test]
    fn test_signoff_uid() {
        assert_eq!(signoff_uid("\"abc\""), "abc");
        assert_eq!(signoff_uid(" abc\n"), "abc");
    }

    #[test]
    fn test_task_group_url() {
        assert_eq!(
            task_group_url("https://firefox-ci-tc.services.mozilla.com/", "T1"),
            "https://firefox-ci-tc.services.mozilla.com/tasks/groups/T1"
        );
    }
}
