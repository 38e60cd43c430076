// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database operations tests for shipit-api.
//!
//! These tests verify the correctness of database CRUD operations.

mod common;

use serde_json::json;
use sqlx::PgPool;

use common::{get_pool, unique_build_number, unique_revision};
use shipit_api::db::{
    self, NewMergeAutomation, NewPhase, NewRelease, NewXpiRelease, ReleaseFilter, ReleaseKind,
    XpiReleaseFilter,
};
use shipit_core::flavors::SignoffRequirement;
use shipit_core::merge::TaskStatus;

/// Skip test if database URL is not set
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_SHIPIT_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_SHIPIT_DATABASE_URL not set");
            return;
        }
    };
}

fn new_release(version: &str, build_number: i32) -> NewRelease {
    NewRelease {
        product: "firefox".to_string(),
        version: version.to_string(),
        branch: "releases/mozilla-release".to_string(),
        revision: unique_revision(),
        build_number,
        release_eta: None,
        partial_updates: Some(json!({"129.0": {"buildNumber": 1, "locales": ["de"]}})),
        product_key: None,
        repo_url: "https://hg.mozilla.org/releases/mozilla-release".to_string(),
    }
}

fn new_phase(name: &str, signoffs: Vec<SignoffRequirement>) -> NewPhase {
    NewPhase {
        name: name.to_string(),
        task: json!({"hook_group_id": "project-releng", "hook_id": "release-promotion"}),
        context: json!({"input": {"release_promotion_flavor": name}}),
        signoffs,
    }
}

fn signoff(name: &str) -> SignoffRequirement {
    SignoffRequirement {
        name: name.to_string(),
        description: format!("{} signoff", name),
        permissions: "admin".to_string(),
    }
}

/// Create a Firefox release with three phases, the last one requiring a signoff.
async fn create_test_release(pool: &PgPool) -> db::Release {
    let build_number = unique_build_number();
    let name = format!("Firefox-130.0-build{}", build_number);
    db::create_release(
        pool,
        &name,
        &new_release("130.0", build_number),
        &[
            new_phase("promote_firefox", vec![]),
            new_phase("push_firefox", vec![]),
            new_phase("ship_firefox", vec![signoff("Release management")]),
        ],
    )
    .await
    .expect("Failed to create release")
}

// ============================================================================
// Release Tests
// ============================================================================

#[tokio::test]
async fn test_create_and_get_release() {
    skip_if_no_db!();
    let pool = get_pool().await.expect("Failed to connect to database");

    let created = create_test_release(&pool).await;
    assert_eq!(created.status, "scheduled");
    assert!(created.completed.is_none());

    let release = db::get_release(&pool, &created.name)
        .await
        .expect("Failed to get release")
        .expect("Release not found");
    assert_eq!(release.id, created.id);
    assert_eq!(release.project(), "mozilla-release");
    assert_eq!(release.partial_updates.unwrap()["129.0"]["buildNumber"], 1);

    let phases = db::get_phases(&pool, ReleaseKind::Product, release.id)
        .await
        .unwrap();
    let names: Vec<_> = phases.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["promote_firefox", "push_firefox", "ship_firefox"]);
    assert!(phases.iter().all(|p| !p.submitted && p.task_id.is_empty()));

    let signoffs = db::get_signoffs(&pool, ReleaseKind::Product, phases[2].id)
        .await
        .unwrap();
    assert_eq!(signoffs.len(), 1);
    assert!(!signoffs[0].signed);
    assert!(!signoffs[0].uid.starts_with('-'));
}

#[tokio::test]
async fn test_duplicate_release_name() {
    skip_if_no_db!();
    let pool = get_pool().await.expect("Failed to connect to database");

    let created = create_test_release(&pool).await;
    let result = db::create_release(
        &pool,
        &created.name,
        &new_release("130.0", created.build_number),
        &[],
    )
    .await;
    let err = result.expect_err("Duplicate name should fail");
    let is_unique_violation = err
        .as_database_error()
        .map(|e| e.is_unique_violation())
        .unwrap_or(false);
    assert!(is_unique_violation);
}

#[tokio::test]
async fn test_get_release_not_found() {
    skip_if_no_db!();
    let pool = get_pool().await.expect("Failed to connect to database");

    let release = db::get_release(&pool, "Firefox-0.0-build0").await.unwrap();
    assert!(release.is_none());
}

#[tokio::test]
async fn test_list_releases_with_filters() {
    skip_if_no_db!();
    let pool = get_pool().await.expect("Failed to connect to database");

    let created = create_test_release(&pool).await;
    db::set_release_status(&pool, ReleaseKind::Product, created.id, "aborted")
        .await
        .unwrap();

    let filter = ReleaseFilter {
        product: Some("firefox".into()),
        version: Some("130.0".into()),
        build_number: Some(created.build_number),
        statuses: vec!["scheduled".into()],
        ..Default::default()
    };
    let scheduled = db::list_releases(&pool, &filter).await.unwrap();
    assert!(scheduled.iter().all(|r| r.id != created.id));

    let filter = ReleaseFilter {
        statuses: vec!["scheduled".into(), "aborted".into()],
        ..filter
    };
    let any = db::list_releases(&pool, &filter).await.unwrap();
    assert_eq!(any.len(), 1);
    assert_eq!(any[0].status, "aborted");
    assert!(any[0].completed.is_none());
}

#[tokio::test]
async fn test_shipped_release_is_stamped() {
    skip_if_no_db!();
    let pool = get_pool().await.expect("Failed to connect to database");

    let created = create_test_release(&pool).await;
    db::set_release_status(&pool, ReleaseKind::Product, created.id, "shipped")
        .await
        .unwrap();

    let release = db::get_release(&pool, &created.name).await.unwrap().unwrap();
    assert_eq!(release.status, "shipped");
    assert!(release.completed.is_some());

    let shipped = db::shipped_releases(&pool, "firefox", "releases/mozilla-release")
        .await
        .unwrap();
    assert!(shipped.iter().any(|r| r.name == created.name));

    let since = db::shipped_releases_since(&pool, 130).await.unwrap();
    assert!(since.iter().any(|r| r.name == created.name));
    let since = db::shipped_releases_since(&pool, 131).await.unwrap();
    assert!(since.iter().all(|r| r.name != created.name));
}

// ============================================================================
// Phase and Signoff Tests
// ============================================================================

#[tokio::test]
async fn test_mark_phase_submitted_skips_earlier_phases() {
    skip_if_no_db!();
    let pool = get_pool().await.expect("Failed to connect to database");

    let release = create_test_release(&pool).await;
    let phases = db::get_phases(&pool, ReleaseKind::Product, release.id)
        .await
        .unwrap();

    let submitted = db::mark_phase_submitted(
        &pool,
        ReleaseKind::Product,
        &phases[1],
        "ACTION-1",
        "releng@mozilla.com",
    )
    .await
    .unwrap();
    assert!(submitted);

    let phases = db::get_phases(&pool, ReleaseKind::Product, release.id)
        .await
        .unwrap();
    assert!(phases[0].submitted);
    assert!(phases[0].skipped());
    assert!(phases[1].submitted);
    assert_eq!(phases[1].task_id, "ACTION-1");
    assert_eq!(phases[1].completed_by.as_deref(), Some("releng@mozilla.com"));
    assert!(!phases[2].submitted);

    // A second submission loses the race
    let again = db::mark_phase_submitted(
        &pool,
        ReleaseKind::Product,
        &phases[1],
        "ACTION-2",
        "releng@mozilla.com",
    )
    .await
    .unwrap();
    assert!(!again);
}

#[tokio::test]
async fn test_sign_signoff_once() {
    skip_if_no_db!();
    let pool = get_pool().await.expect("Failed to connect to database");

    let release = create_test_release(&pool).await;
    let phases = db::get_phases(&pool, ReleaseKind::Product, release.id)
        .await
        .unwrap();
    let signoffs = db::get_signoffs(&pool, ReleaseKind::Product, phases[2].id)
        .await
        .unwrap();

    let found = db::get_signoff_by_uid(&pool, ReleaseKind::Product, &signoffs[0].uid)
        .await
        .unwrap()
        .expect("Signoff not found");
    assert_eq!(found.id, signoffs[0].id);

    assert!(
        db::sign_signoff(&pool, ReleaseKind::Product, found.id, "rm@mozilla.com")
            .await
            .unwrap()
    );
    assert!(
        !db::sign_signoff(&pool, ReleaseKind::Product, found.id, "other@mozilla.com")
            .await
            .unwrap()
    );

    let signed = db::get_signoff_by_uid(&pool, ReleaseKind::Product, &found.uid)
        .await
        .unwrap()
        .unwrap();
    assert!(signed.signed);
    assert_eq!(signed.completed_by.as_deref(), Some("rm@mozilla.com"));
    assert!(signed.completed.is_some());
}

// ============================================================================
// XPI Release Tests
// ============================================================================

#[tokio::test]
async fn test_create_and_list_xpi_release() {
    skip_if_no_db!();
    let pool = get_pool().await.expect("Failed to connect to database");

    let build_number = unique_build_number();
    let xpi_name = format!("test-addon-{}", unique_revision());
    let name = format!("{}-1.0.0-build{}", xpi_name, build_number);
    let created = db::create_xpi_release(
        &pool,
        &name,
        &NewXpiRelease {
            build_number,
            xpi_name: xpi_name.clone(),
            xpi_revision: unique_revision(),
            xpi_version: "1.0.0".to_string(),
            xpi_type: "privileged".to_string(),
            project: "xpi-manifest".to_string(),
            revision: unique_revision(),
        },
        &[new_phase("build", vec![]), new_phase("promote", vec![signoff("Add-on review")])],
    )
    .await
    .expect("Failed to create XPI release");

    let listed = db::list_xpi_releases(
        &pool,
        &XpiReleaseFilter {
            xpi_name: Some(xpi_name),
            statuses: vec!["scheduled".into()],
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, name);

    let phases = db::get_phases(&pool, ReleaseKind::Xpi, created.id).await.unwrap();
    let json = created.to_json(&phases);
    assert_eq!(json["xpi_type"], "privileged");
    assert_eq!(json["phases"].as_array().unwrap().len(), 2);

    let signoffs = db::get_signoffs(&pool, ReleaseKind::Xpi, phases[1].id)
        .await
        .unwrap();
    assert_eq!(signoffs.len(), 1);
    // Signoff tables are per release kind
    let other_kind = db::get_signoff_by_uid(&pool, ReleaseKind::Product, &signoffs[0].uid)
        .await
        .unwrap();
    assert!(other_kind.is_none());
}

// ============================================================================
// Disabled Products and Versions
// ============================================================================

#[tokio::test]
async fn test_disable_and_enable_product() {
    skip_if_no_db!();
    let pool = get_pool().await.expect("Failed to connect to database");

    let product = format!("test-product-{}", unique_revision());
    db::disable_product(&pool, &product, "beta").await.unwrap();
    // Idempotent
    db::disable_product(&pool, &product, "beta").await.unwrap();
    db::disable_product(&pool, &product, "release").await.unwrap();

    assert!(db::is_product_disabled(&pool, &product, "beta").await.unwrap());
    let disabled = db::list_disabled_products(&pool).await.unwrap();
    assert_eq!(disabled[&product], vec!["beta", "release"]);

    assert!(db::enable_product(&pool, &product, "beta").await.unwrap());
    assert!(!db::enable_product(&pool, &product, "beta").await.unwrap());
    assert!(!db::is_product_disabled(&pool, &product, "beta").await.unwrap());
}

#[tokio::test]
async fn test_set_and_get_version() {
    skip_if_no_db!();
    let pool = get_pool().await.expect("Failed to connect to database");

    let product = format!("test-product-{}", unique_revision());
    assert_eq!(db::get_version(&pool, &product, "nightly").await.unwrap(), None);

    db::set_version(&pool, &product, "nightly", "150.0a1").await.unwrap();
    db::set_version(&pool, &product, "nightly", "151.0a1").await.unwrap();
    assert_eq!(
        db::get_version(&pool, &product, "nightly").await.unwrap().as_deref(),
        Some("151.0a1")
    );
    assert_eq!(db::get_version(&pool, &product, "beta").await.unwrap(), None);
}

// ============================================================================
// Merge Automation Tests
// ============================================================================

#[tokio::test]
async fn test_merge_automation_lifecycle() {
    skip_if_no_db!();
    let pool = get_pool().await.expect("Failed to connect to database");

    let product = format!("test-product-{}", unique_revision());
    let created = db::create_merge_automation(
        &pool,
        &NewMergeAutomation {
            product: product.clone(),
            behavior: "main-to-beta".to_string(),
            revision: unique_revision(),
            version: "131.0a1".to_string(),
            dry_run: true,
            commit_message: Some("Merge main to beta".to_string()),
            commit_author: Some("releng@mozilla.com".to_string()),
            repo: "https://hg.mozilla.org/try".to_string(),
            pretty_name: "Main -> beta".to_string(),
            project: "try".to_string(),
        },
    )
    .await
    .expect("Failed to create merge automation");
    assert_eq!(created.task_status(), TaskStatus::Pending);
    assert!(created.task_id.is_none());

    let mut tx = pool.begin().await.unwrap();
    let locked = db::lock_merge_automation(&mut tx, created.id)
        .await
        .unwrap()
        .expect("Automation not found");
    db::set_merge_automation_started(&mut tx, locked.id, "MERGE-TASK")
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let started = db::get_merge_automation(&pool, created.id).await.unwrap().unwrap();
    assert_eq!(started.task_status(), TaskStatus::Running);
    assert_eq!(started.task_id.as_deref(), Some("MERGE-TASK"));

    let completed = db::set_merge_automation_status(&pool, created.id, TaskStatus::Completed)
        .await
        .unwrap();
    assert!(completed.completed.is_some());

    let listed = db::list_merge_automations(&pool, &product).await.unwrap();
    assert_eq!(listed.len(), 1);

    db::set_merge_automation_status(&pool, created.id, TaskStatus::Canceled)
        .await
        .unwrap();
    let listed = db::list_merge_automations(&pool, &product).await.unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn test_merge_automation_listing_order() {
    skip_if_no_db!();
    let pool = get_pool().await.expect("Failed to connect to database");

    let product = format!("test-product-{}", unique_revision());
    let automation = |behavior: &str| NewMergeAutomation {
        product: product.clone(),
        behavior: behavior.to_string(),
        revision: unique_revision(),
        version: "131.0".to_string(),
        dry_run: false,
        commit_message: None,
        commit_author: None,
        repo: "https://hg.mozilla.org/releases/mozilla-beta".to_string(),
        pretty_name: behavior.to_string(),
        project: "mozilla-beta".to_string(),
    };

    let first = db::create_merge_automation(&pool, &automation("beta-to-release"))
        .await
        .unwrap();
    let second = db::create_merge_automation(&pool, &automation("main-to-beta"))
        .await
        .unwrap();
    db::set_merge_automation_status(&pool, second.id, TaskStatus::Completed)
        .await
        .unwrap();

    let listed = db::list_merge_automations(&pool, &product).await.unwrap();
    let ids: Vec<i32> = listed.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![first.id, second.id]);
}
