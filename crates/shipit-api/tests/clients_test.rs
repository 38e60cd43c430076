// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP client tests against mock servers: Taskcluster, GitHub GraphQL,
//! hg.mozilla.org l10n changesets and the release schedule API.

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header_exists, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shipit_api::config::{GitHubConfig, TaskclusterConfig};
use shipit_api::github::{GitHub, GitHubError, GraphQlClient};
use shipit_api::product_details::l10n::{L10nFetcher, get_locales};
use shipit_api::product_details::schedule::ScheduleClient;
use shipit_api::retry::RetryConfig;
use shipit_api::taskcluster::{Taskcluster, TaskclusterClient, TaskclusterError};
use shipit_core::product_details::ReleaseRecord;

fn taskcluster(server: &MockServer, credentials: bool) -> TaskclusterClient {
    TaskclusterClient::new(&TaskclusterConfig {
        root_url: server.uri(),
        client_id: credentials.then(|| "project/releng/shipit".to_string()),
        access_token: credentials.then(|| "secret".to_string()),
    })
}

fn github(server: &MockServer) -> GraphQlClient {
    GraphQlClient::new(&GitHubConfig {
        token: Some("token".to_string()),
        api_url: format!("{}/graphql", server.uri()),
        xpi_manifest_owner: "mozilla-extensions".to_string(),
        xpi_manifest_repo: "xpi-manifest".to_string(),
        skip_private_repos: false,
    })
}

fn no_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 1,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
        max_elapsed: Duration::from_secs(1),
        backoff_multiplier: 1.0,
    }
}

fn shipped(name: &str, branch: &str, revision: &str) -> ReleaseRecord {
    ReleaseRecord {
        name: name.to_string(),
        product: "firefox".to_string(),
        version: "130.0".to_string(),
        branch: branch.to_string(),
        revision: revision.to_string(),
        build_number: 1,
        status: "shipped".to_string(),
        created: None,
        completed: None,
    }
}

// ============================================================================
// Taskcluster
// ============================================================================

#[tokio::test]
async fn test_find_task() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(
            "/api/index/v1/task/gecko.v2.mozilla-release.revision.abc.taskgraph.decision",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"taskId": "DECISION"})))
        .expect(1)
        .mount(&server)
        .await;

    let tc = taskcluster(&server, false);
    let task_id = tc
        .find_task("gecko.v2.mozilla-release.revision.abc.taskgraph.decision")
        .await
        .unwrap();
    assert_eq!(task_id, "DECISION");
}

#[tokio::test]
async fn test_get_latest_artifact_parses_yaml() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/queue/v1/task/DECISION/artifacts/.*parameters\.yml$"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("project: mozilla-release\nlevel: '3'\n"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/queue/v1/task/DECISION/artifacts/.*actions\.json$"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let tc = taskcluster(&server, false);
    let parameters = tc
        .get_latest_artifact("DECISION", "public/parameters.yml")
        .await
        .unwrap();
    assert_eq!(parameters["project"], "mozilla-release");
    assert_eq!(parameters["level"], "3");

    let err = tc
        .get_latest_artifact("DECISION", "public/actions.json")
        .await
        .unwrap_err();
    assert!(matches!(err, TaskclusterError::ArtifactNotFound { .. }));
}

#[tokio::test]
async fn test_trigger_hook_is_signed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/api/hooks/v1/hooks/project-releng/.+/trigger$"))
        .and(header_exists("authorization"))
        .and(body_partial_json(json!({"user": {"input": {"release_promotion_flavor": "ship_firefox"}}})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": {"taskId": "ACTION"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let tc = taskcluster(&server, true);
    let task_id = tc
        .trigger_hook(
            "project-releng",
            "in-tree-action-3-release-promotion/abc",
            &json!({"user": {"input": {"release_promotion_flavor": "ship_firefox"}}}),
        )
        .await
        .unwrap();
    assert_eq!(task_id, "ACTION");
}

#[tokio::test]
async fn test_trigger_hook_without_credentials() {
    let server = MockServer::start().await;
    let tc = taskcluster(&server, false);
    let err = tc
        .trigger_hook("project-releng", "hook", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, TaskclusterError::MissingCredentials));
}

#[tokio::test]
async fn test_list_task_group_follows_continuation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/queue/v1/task-group/GROUP/list"))
        .and(query_param("continuationToken", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tasks": [{"status": {"taskId": "B", "state": "failed"}, "task": {}}],
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/queue/v1/task-group/GROUP/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tasks": [{
                "status": {"taskId": "A", "state": "completed"},
                "task": {"tags": {"kind": "release-signing"}}
            }],
            "continuationToken": "page2",
        })))
        .mount(&server)
        .await;

    let tc = taskcluster(&server, false);
    let tasks = tc.list_task_group("GROUP").await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].task_id, "A");
    assert_eq!(tasks[0].kind.as_deref(), Some("release-signing"));
    assert_eq!(tasks[1].state, "failed");
}

#[tokio::test]
async fn test_api_error_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/queue/v1/task/MISSING/status"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"code": "ResourceNotFound", "message": "no such task"})),
        )
        .mount(&server)
        .await;

    let tc = taskcluster(&server, false);
    let err = tc.task_state("MISSING").await.unwrap_err();
    assert_eq!(err.status_code(), Some(404));
    assert!(err.to_string().contains("no such task"));
}

// ============================================================================
// GitHub
// ============================================================================

#[tokio::test]
async fn test_get_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({"variables": {
            "owner": "mozilla-mobile",
            "repo": "firefox-android",
            "expression": "main:version.txt"
        }})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"repository": {"object": {"text": "130.0b1\n"}}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = github(&server);
    let text = client
        .get_file("mozilla-mobile", "firefox-android", "main", "version.txt")
        .await
        .unwrap();
    assert_eq!(text, "130.0b1\n");
}

#[tokio::test]
async fn test_get_file_rejects_unlisted_paths() {
    let server = MockServer::start().await;
    let client = github(&server);
    let err = client
        .get_file("mozilla-mobile", "firefox-android", "main", "secrets.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, GitHubError::NotAllowed { .. }));
}

#[tokio::test]
async fn test_list_commits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"repository": {"ref": {"target": {"history": {"edges": [{
                "node": {
                    "oid": "abc123",
                    "messageHeadline": "Bump version",
                    "author": {"name": "Release Bot", "email": "bot@example.com"},
                    "committer": {"date": "2026-01-02T03:04:05Z"}
                }
            }]}}}}}
        })))
        .mount(&server)
        .await;

    let commits = github(&server)
        .list_commits("mozilla-mobile", "firefox-android", "main")
        .await
        .unwrap();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].author, "Release Bot <bot@example.com>");
    assert_eq!(commits[0].message, "Bump version");
    assert_eq!(commits[0].revision, "abc123");
}

#[tokio::test]
async fn test_graphql_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{"message": "Could not resolve to a Repository"}]
        })))
        .mount(&server)
        .await;

    let err = github(&server)
        .list_branches("mozilla-mobile", "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, GitHubError::Query(_)));
}

// ============================================================================
// l10n changesets
// ============================================================================

#[tokio::test]
async fn test_get_locales() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(
            "/releases/mozilla-beta/raw-file/abc/browser/locales/l10n-changesets.json",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "de": {"platforms": ["linux64"], "revision": "r1"},
            "fr": {"platforms": ["linux64"], "revision": "r2"}
        })))
        .mount(&server)
        .await;

    let locales = get_locales(
        &reqwest::Client::new(),
        &server.uri(),
        "releases/mozilla-beta",
        "abc",
        "browser",
    )
    .await
    .unwrap();
    assert_eq!(locales, vec!["de", "fr"]);
}

#[tokio::test]
async fn test_fetch_all_uses_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(
            "/releases/mozilla-release/raw-file/abc/browser/locales/l10n-changesets.json",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "de": {"platforms": ["linux64", "win64"], "revision": "r1", "pin": false}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cache = tempfile::tempdir().unwrap();
    let fetcher = L10nFetcher::new(reqwest::Client::new(), &server.uri())
        .with_cache_dir(cache.path().to_path_buf())
        .with_retry(no_retry());
    let releases = vec![
        shipped("Firefox-130.0-build1", "releases/mozilla-release", "abc"),
        ReleaseRecord {
            product: "fenix".to_string(),
            ..shipped("Fenix-130.0-build1", "releases_v130", "def")
        },
    ];

    let first = fetcher.fetch_all(&releases).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first["Firefox-130.0-build1"]["de"].revision, "r1");

    // Served from the cache: the mock expects a single request
    let second = fetcher.fetch_all(&releases).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_fetch_all_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let releases = vec![shipped("Firefox-130.0-build1", "releases/mozilla-release", "abc")];

    let lenient = L10nFetcher::new(reqwest::Client::new(), &server.uri()).with_retry(no_retry());
    let l10n = lenient.fetch_all(&releases).await.unwrap();
    assert!(l10n["Firefox-130.0-build1"].is_empty());

    let strict = L10nFetcher::new(reqwest::Client::new(), &server.uri())
        .with_retry(no_retry())
        .raise_on_failure(true);
    assert!(strict.fetch_all(&releases).await.is_err());
}

// ============================================================================
// Release schedule
// ============================================================================

#[tokio::test]
async fn test_schedule_dates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/release/schedule/"))
        .and(query_param("version", "149"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "soft_code_freeze": "2026-05-14 00:00:00+00:00",
            "merge_day": "2026-05-18 00:00:00+00:00"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/release/schedule/"))
        .and(query_param("version", "150"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "soft_code_freeze": "2026-06-11 00:00:00+00:00",
            "merge_day": "2026-06-15 00:00:00+00:00"
        })))
        .mount(&server)
        .await;

    let client = ScheduleClient::new(
        reqwest::Client::new(),
        &format!("{}/api/release/schedule/", server.uri()),
    )
    .with_retry(no_retry());
    let dates = client.schedule_dates(&[], "150.0a1").await.unwrap();

    assert_eq!(dates.last_softfreeze_date, "2026-05-14");
    assert_eq!(dates.last_stringfreeze_date, "2026-05-15");
    assert_eq!(dates.last_merge_date, "2026-05-18");
    // Nothing shipped since the merge: the day after is assumed
    assert_eq!(dates.last_release_date, "2026-05-19");
    assert_eq!(dates.next_softfreeze_date, "2026-06-11");
    assert_eq!(dates.next_stringfreeze_date, "2026-06-12");
    assert_eq!(dates.next_merge_date, "2026-06-15");
    assert_eq!(dates.next_release_date, "2026-06-16");
}

#[tokio::test]
async fn test_schedule_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = ScheduleClient::new(reqwest::Client::new(), &server.uri()).with_retry(no_retry());
    assert!(client.schedule_dates(&[], "150.0a1").await.is_err());
}
