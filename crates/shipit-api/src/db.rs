// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database operations for shipit-api.
//!
//! Product releases and XPI releases live in parallel table sets with the
//! same phase and signoff shape; [`ReleaseKind`] selects the set.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};
use shipit_core::flavors::SignoffRequirement;
use shipit_core::merge::TaskStatus;
use shipit_core::product_details::ReleaseRecord;
use shipit_core::release::{allow_phase_skipping, project_from_branch};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Channel notified when a product details rebuild is requested.
pub const REBUILD_CHANNEL: &str = "rebuild_product_details";

/// Claimed rebuild requests are handed out again after this many seconds.
const REBUILD_CLAIM_TIMEOUT_SECS: i64 = 3600;

/// Which table set a release lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseKind {
    Product,
    Xpi,
}

impl ReleaseKind {
    fn releases_table(self) -> &'static str {
        match self {
            ReleaseKind::Product => "shipit_api_releases",
            ReleaseKind::Xpi => "shipit_api_xpi_releases",
        }
    }

    fn phases_table(self) -> &'static str {
        match self {
            ReleaseKind::Product => "shipit_api_phases",
            ReleaseKind::Xpi => "shipit_api_xpi_phases",
        }
    }

    fn signoffs_table(self) -> &'static str {
        match self {
            ReleaseKind::Product => "shipit_api_signoffs",
            ReleaseKind::Xpi => "shipit_api_xpi_signoffs",
        }
    }
}

/// Product release record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Release {
    pub id: i32,
    /// Unique release name (`Firefox-130.0-build1`).
    pub name: String,
    pub product: String,
    pub version: String,
    pub branch: String,
    pub revision: String,
    pub build_number: i32,
    pub release_eta: Option<String>,
    /// scheduled, shipped or aborted.
    pub status: String,
    /// `{version: {buildNumber, locales}}` of the partial updates to build.
    pub partial_updates: Option<Value>,
    /// Flavor set used instead of the product's own.
    pub product_key: Option<String>,
    pub repo_url: String,
    pub created: DateTime<Utc>,
    pub completed: Option<DateTime<Utc>>,
}

/// XPI (add-on) release record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct XpiRelease {
    pub id: i32,
    pub name: String,
    pub build_number: i32,
    pub status: String,
    pub xpi_name: String,
    /// Revision of the add-on repository.
    pub xpi_revision: String,
    pub xpi_version: String,
    /// Manifest type (privileged, system_newtab, ...).
    pub xpi_type: String,
    /// Manifest repository name.
    pub project: String,
    /// Revision of the manifest repository.
    pub revision: String,
    pub created: DateTime<Utc>,
    pub completed: Option<DateTime<Utc>>,
}

/// Phase record, shared by both release kinds.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Phase {
    pub id: i32,
    pub release_id: i32,
    pub name: String,
    pub submitted: bool,
    /// Task id of the triggered action; empty until scheduled or when skipped.
    pub task_id: String,
    /// Action hook without its render context.
    pub task: Value,
    /// Render context of the hook payload.
    pub context: Value,
    pub created: DateTime<Utc>,
    pub completed: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
}

/// Signoff record, shared by both release kinds.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Signoff {
    pub id: i32,
    /// Public identifier used by the sign-off endpoint.
    pub uid: String,
    pub name: String,
    pub description: String,
    /// Key into the signoff groups table.
    pub permissions: String,
    pub completed: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
    pub signed: bool,
    pub phase_id: i32,
}

/// Merge automation record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MergeAutomation {
    pub id: i32,
    pub product: String,
    pub behavior: String,
    pub revision: String,
    pub version: String,
    pub dry_run: bool,
    pub commit_message: Option<String>,
    pub commit_author: Option<String>,
    pub repo: String,
    pub pretty_name: String,
    pub project: String,
    pub status: String,
    /// Task id of the triggered merge action.
    pub task_id: Option<String>,
    pub created: DateTime<Utc>,
    pub completed: Option<DateTime<Utc>>,
}

/// Queued product details rebuild.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RebuildRequest {
    pub id: i64,
    pub payload: Value,
    pub requested_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
}

fn timestamp(date: Option<DateTime<Utc>>) -> Value {
    date.map(|d| json!(d.to_rfc3339_opts(SecondsFormat::Micros, true)))
        .unwrap_or_else(|| json!(""))
}

fn nullable_timestamp(date: Option<DateTime<Utc>>) -> Value {
    date.map(|d| json!(d.to_rfc3339_opts(SecondsFormat::Micros, true)))
        .unwrap_or(Value::Null)
}

impl Release {
    pub fn project(&self) -> &str {
        project_from_branch(&self.branch)
    }

    pub fn to_json(&self, phases: &[Phase]) -> Value {
        json!({
            "name": self.name,
            "product": self.product,
            "branch": self.branch,
            "project": self.project(),
            "version": self.version,
            "revision": self.revision,
            "build_number": self.build_number,
            "release_eta": self.release_eta.clone().unwrap_or_default(),
            "status": self.status,
            "created": timestamp(Some(self.created)),
            "completed": timestamp(self.completed),
            "phases": phases.iter().map(Phase::to_json).collect::<Vec<_>>(),
            "allow_phase_skipping": allow_phase_skipping(&self.product, self.project()),
        })
    }

    /// The release as seen by the product details generators.
    pub fn to_record(&self) -> ReleaseRecord {
        ReleaseRecord {
            name: self.name.clone(),
            product: self.product.clone(),
            version: self.version.clone(),
            branch: self.branch.clone(),
            revision: self.revision.clone(),
            build_number: self.build_number,
            status: self.status.clone(),
            created: Some(self.created),
            completed: self.completed,
        }
    }
}

impl XpiRelease {
    pub fn to_json(&self, phases: &[Phase]) -> Value {
        json!({
            "name": self.name,
            "revision": self.revision,
            "xpi_name": self.xpi_name,
            "xpi_revision": self.xpi_revision,
            "xpi_version": self.xpi_version,
            "xpi_type": self.xpi_type,
            "project": self.project,
            "build_number": self.build_number,
            "status": self.status,
            "created": timestamp(Some(self.created)),
            "completed": timestamp(self.completed),
            "phases": phases.iter().map(Phase::to_json).collect::<Vec<_>>(),
        })
    }
}

impl Phase {
    /// Submitted without a task: an earlier phase was skipped over.
    pub fn skipped(&self) -> bool {
        self.submitted && self.task_id.is_empty()
    }

    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "submitted": self.submitted,
            "actionTaskId": self.task_id,
            "created": timestamp(Some(self.created)),
            "completed": timestamp(self.completed),
            "skipped": self.skipped(),
        })
    }
}

impl Signoff {
    pub fn to_json(&self) -> Value {
        json!({
            "uid": self.uid,
            "name": self.name,
            "description": self.description,
            "permissions": self.permissions,
            "completed": timestamp(self.completed),
            "completed_by": self.completed_by.clone().unwrap_or_default(),
            "signed": self.signed,
        })
    }
}

impl MergeAutomation {
    /// Stored status; unknown values read as pending.
    pub fn task_status(&self) -> TaskStatus {
        self.status.parse().unwrap_or(TaskStatus::Pending)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "product": self.product,
            "behavior": self.behavior,
            "pretty_name": self.pretty_name,
            "revision": self.revision,
            "version": self.version,
            "repo": self.repo,
            "status": self.status,
            "created": nullable_timestamp(Some(self.created)),
            "completed": nullable_timestamp(self.completed),
            "task_id": self.task_id,
            "dry_run": self.dry_run,
            "commit_message": self.commit_message,
            "commit_author": self.commit_author,
        })
    }
}

/// Signoff identifier: a url-safe base64 uuid whose first character is
/// never `-`.
pub fn new_uid() -> String {
    let mut bytes = *Uuid::new_v4().as_bytes();
    bytes[0] &= 0x7f;
    URL_SAFE_NO_PAD.encode(bytes)
}

// ============================================================================
// Releases
// ============================================================================

/// Fields of a product release to create.
#[derive(Debug, Clone)]
pub struct NewRelease {
    pub product: String,
    pub version: String,
    pub branch: String,
    pub revision: String,
    pub build_number: i32,
    pub release_eta: Option<String>,
    pub partial_updates: Option<Value>,
    pub product_key: Option<String>,
    pub repo_url: String,
}

/// Fields of an XPI release to create.
#[derive(Debug, Clone)]
pub struct NewXpiRelease {
    pub build_number: i32,
    pub xpi_name: String,
    pub xpi_revision: String,
    pub xpi_version: String,
    pub xpi_type: String,
    pub project: String,
    pub revision: String,
}

/// A phase to create together with its release.
#[derive(Debug, Clone)]
pub struct NewPhase {
    pub name: String,
    pub task: Value,
    pub context: Value,
    pub signoffs: Vec<SignoffRequirement>,
}

/// Create a product release with its phases and signoffs.
///
/// A duplicate name fails with the database's unique violation.
pub async fn create_release(
    pool: &PgPool,
    name: &str,
    release: &NewRelease,
    phases: &[NewPhase],
) -> Result<Release, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let created = sqlx::query_as::<_, Release>(
        r#"
        INSERT INTO shipit_api_releases
            (name, product, version, branch, revision, build_number, release_eta,
             status, partial_updates, product_key, repo_url, created)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'scheduled', $8, $9, $10, NOW())
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(&release.product)
    .bind(&release.version)
    .bind(&release.branch)
    .bind(&release.revision)
    .bind(release.build_number)
    .bind(&release.release_eta)
    .bind(&release.partial_updates)
    .bind(&release.product_key)
    .bind(&release.repo_url)
    .fetch_one(&mut *tx)
    .await?;

    insert_phases(&mut tx, ReleaseKind::Product, created.id, phases).await?;
    tx.commit().await?;

    Ok(created)
}

/// Create an XPI release with its phases and signoffs.
pub async fn create_xpi_release(
    pool: &PgPool,
    name: &str,
    release: &NewXpiRelease,
    phases: &[NewPhase],
) -> Result<XpiRelease, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let created = sqlx::query_as::<_, XpiRelease>(
        r#"
        INSERT INTO shipit_api_xpi_releases
            (name, build_number, status, xpi_name, xpi_revision, xpi_version,
             xpi_type, project, revision, created)
        VALUES ($1, $2, 'scheduled', $3, $4, $5, $6, $7, $8, NOW())
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(release.build_number)
    .bind(&release.xpi_name)
    .bind(&release.xpi_revision)
    .bind(&release.xpi_version)
    .bind(&release.xpi_type)
    .bind(&release.project)
    .bind(&release.revision)
    .fetch_one(&mut *tx)
    .await?;

    insert_phases(&mut tx, ReleaseKind::Xpi, created.id, phases).await?;
    tx.commit().await?;

    Ok(created)
}

async fn insert_phases(
    tx: &mut Transaction<'_, Postgres>,
    kind: ReleaseKind,
    release_id: i32,
    phases: &[NewPhase],
) -> Result<(), sqlx::Error> {
    let phase_sql = format!(
        "INSERT INTO {} (release_id, name, submitted, task_id, task, context, created) \
         VALUES ($1, $2, FALSE, '', $3, $4, NOW()) RETURNING id",
        kind.phases_table()
    );
    let signoff_sql = format!(
        "INSERT INTO {} (uid, name, description, permissions, signed, phase_id) \
         VALUES ($1, $2, $3, $4, FALSE, $5)",
        kind.signoffs_table()
    );

    for phase in phases {
        let phase_id: i32 = sqlx::query_scalar(&phase_sql)
            .bind(release_id)
            .bind(&phase.name)
            .bind(&phase.task)
            .bind(&phase.context)
            .fetch_one(&mut **tx)
            .await?;

        for signoff in &phase.signoffs {
            sqlx::query(&signoff_sql)
                .bind(new_uid())
                .bind(&signoff.name)
                .bind(&signoff.description)
                .bind(&signoff.permissions)
                .bind(phase_id)
                .execute(&mut **tx)
                .await?;
        }
    }
    Ok(())
}

/// Get a product release by name.
pub async fn get_release(pool: &PgPool, name: &str) -> Result<Option<Release>, sqlx::Error> {
    sqlx::query_as::<_, Release>("SELECT * FROM shipit_api_releases WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await
}

/// Get an XPI release by name.
pub async fn get_xpi_release(pool: &PgPool, name: &str) -> Result<Option<XpiRelease>, sqlx::Error> {
    sqlx::query_as::<_, XpiRelease>("SELECT * FROM shipit_api_xpi_releases WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await
}

/// Filters of the product release listing.
#[derive(Debug, Clone, Default)]
pub struct ReleaseFilter {
    pub product: Option<String>,
    pub branch: Option<String>,
    pub version: Option<String>,
    pub build_number: Option<i32>,
    /// Any of these statuses.
    pub statuses: Vec<String>,
}

/// List product releases matching the filter.
pub async fn list_releases(
    pool: &PgPool,
    filter: &ReleaseFilter,
) -> Result<Vec<Release>, sqlx::Error> {
    let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM shipit_api_releases WHERE TRUE");
    if let Some(product) = &filter.product {
        query.push(" AND product = ").push_bind(product);
    }
    if let Some(branch) = &filter.branch {
        query.push(" AND branch = ").push_bind(branch);
    }
    if let Some(version) = &filter.version {
        query.push(" AND version = ").push_bind(version);
    }
    if let Some(build_number) = filter.build_number {
        query.push(" AND build_number = ").push_bind(build_number);
    }
    if !filter.statuses.is_empty() {
        query.push(" AND status = ANY(").push_bind(&filter.statuses).push(")");
    }
    query.push(" ORDER BY id");

    query.build_query_as::<Release>().fetch_all(pool).await
}

/// Filters of the XPI release listing.
#[derive(Debug, Clone, Default)]
pub struct XpiReleaseFilter {
    pub xpi_name: Option<String>,
    pub xpi_version: Option<String>,
    pub build_number: Option<i32>,
    pub statuses: Vec<String>,
}

/// List XPI releases matching the filter.
pub async fn list_xpi_releases(
    pool: &PgPool,
    filter: &XpiReleaseFilter,
) -> Result<Vec<XpiRelease>, sqlx::Error> {
    let mut query =
        QueryBuilder::<Postgres>::new("SELECT * FROM shipit_api_xpi_releases WHERE TRUE");
    if let Some(xpi_name) = &filter.xpi_name {
        query.push(" AND xpi_name = ").push_bind(xpi_name);
    }
    if let Some(xpi_version) = &filter.xpi_version {
        query.push(" AND xpi_version = ").push_bind(xpi_version);
    }
    if let Some(build_number) = filter.build_number {
        query.push(" AND build_number = ").push_bind(build_number);
    }
    if !filter.statuses.is_empty() {
        query.push(" AND status = ANY(").push_bind(&filter.statuses).push(")");
    }
    query.push(" ORDER BY id");

    query.build_query_as::<XpiRelease>().fetch_all(pool).await
}

/// Set the status of a release. `completed` is stamped for shipped releases.
pub async fn set_release_status(
    pool: &PgPool,
    kind: ReleaseKind,
    release_id: i32,
    status: &str,
) -> Result<(), sqlx::Error> {
    let sql = format!(
        "UPDATE {} SET status = $2, \
         completed = CASE WHEN $2 = 'shipped' THEN NOW() ELSE completed END \
         WHERE id = $1",
        kind.releases_table()
    );
    sqlx::query(&sql)
        .bind(release_id)
        .bind(status)
        .execute(pool)
        .await?;
    Ok(())
}

/// Shipped product releases of one product and branch.
pub async fn shipped_releases(
    pool: &PgPool,
    product: &str,
    branch: &str,
) -> Result<Vec<Release>, sqlx::Error> {
    sqlx::query_as::<_, Release>(
        r#"
        SELECT * FROM shipit_api_releases
        WHERE product = $1 AND branch = $2 AND status = 'shipped'
        "#,
    )
    .bind(product)
    .bind(branch)
    .fetch_all(pool)
    .await
}

/// Shipped releases whose major version is at least `breakpoint`.
pub async fn shipped_releases_since(
    pool: &PgPool,
    breakpoint: u32,
) -> Result<Vec<ReleaseRecord>, sqlx::Error> {
    let releases = sqlx::query_as::<_, Release>(
        r#"
        SELECT * FROM shipit_api_releases
        WHERE status = 'shipped'
          AND split_part(version, '.', 1) ~ '^[0-9]+$'
          AND split_part(version, '.', 1)::int >= $1
        ORDER BY id
        "#,
    )
    .bind(breakpoint as i32)
    .fetch_all(pool)
    .await?;

    Ok(releases.iter().map(Release::to_record).collect())
}

// ============================================================================
// Phases and signoffs
// ============================================================================

/// Phases of a release in creation order.
pub async fn get_phases(
    pool: &PgPool,
    kind: ReleaseKind,
    release_id: i32,
) -> Result<Vec<Phase>, sqlx::Error> {
    let sql = format!(
        "SELECT * FROM {} WHERE release_id = $1 ORDER BY id",
        kind.phases_table()
    );
    sqlx::query_as::<_, Phase>(&sql)
        .bind(release_id)
        .fetch_all(pool)
        .await
}

/// Signoffs of a phase in creation order.
pub async fn get_signoffs(
    pool: &PgPool,
    kind: ReleaseKind,
    phase_id: i32,
) -> Result<Vec<Signoff>, sqlx::Error> {
    let sql = format!(
        "SELECT * FROM {} WHERE phase_id = $1 ORDER BY id",
        kind.signoffs_table()
    );
    sqlx::query_as::<_, Signoff>(&sql)
        .bind(phase_id)
        .fetch_all(pool)
        .await
}

/// Find a signoff by its public identifier.
pub async fn get_signoff_by_uid(
    pool: &PgPool,
    kind: ReleaseKind,
    uid: &str,
) -> Result<Option<Signoff>, sqlx::Error> {
    let sql = format!("SELECT * FROM {} WHERE uid = $1", kind.signoffs_table());
    sqlx::query_as::<_, Signoff>(&sql)
        .bind(uid)
        .fetch_optional(pool)
        .await
}

/// Mark a phase as submitted with its task id and mark every earlier phase
/// that was never submitted as skipped.
///
/// Returns false when the phase was submitted concurrently.
pub async fn mark_phase_submitted(
    pool: &PgPool,
    kind: ReleaseKind,
    phase: &Phase,
    task_id: &str,
    completed_by: &str,
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        "UPDATE {} SET submitted = TRUE, task_id = $2, completed_by = $3, completed = NOW() \
         WHERE id = $1 AND submitted = FALSE",
        kind.phases_table()
    );
    let updated = sqlx::query(&sql)
        .bind(phase.id)
        .bind(task_id)
        .bind(completed_by)
        .execute(&mut *tx)
        .await?;
    if updated.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    let sql = format!(
        "UPDATE {} SET submitted = TRUE, completed_by = $3, completed = NOW() \
         WHERE release_id = $1 AND id < $2 AND submitted = FALSE",
        kind.phases_table()
    );
    sqlx::query(&sql)
        .bind(phase.release_id)
        .bind(phase.id)
        .bind(completed_by)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(true)
}

/// Record a signature. Returns false when the signoff was signed concurrently.
pub async fn sign_signoff(
    pool: &PgPool,
    kind: ReleaseKind,
    signoff_id: i32,
    completed_by: &str,
) -> Result<bool, sqlx::Error> {
    let sql = format!(
        "UPDATE {} SET signed = TRUE, completed_by = $2, completed = NOW() \
         WHERE id = $1 AND signed = FALSE",
        kind.signoffs_table()
    );
    let result = sqlx::query(&sql)
        .bind(signoff_id)
        .bind(completed_by)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Disabled products and versions
// ============================================================================

/// Disabled branches per product.
pub async fn list_disabled_products(
    pool: &PgPool,
) -> Result<BTreeMap<String, Vec<String>>, sqlx::Error> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT product, branch FROM shipit_api_disabled_products ORDER BY product, branch",
    )
    .fetch_all(pool)
    .await?;

    let mut disabled: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (product, branch) in rows {
        disabled.entry(product).or_default().push(branch);
    }
    Ok(disabled)
}

pub async fn is_product_disabled(
    pool: &PgPool,
    product: &str,
    branch: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM shipit_api_disabled_products WHERE product = $1 AND branch = $2)",
    )
    .bind(product)
    .bind(branch)
    .fetch_one(pool)
    .await
}

/// Disable automated submissions of a product branch. Idempotent.
pub async fn disable_product(pool: &PgPool, product: &str, branch: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO shipit_api_disabled_products (product, branch)
        VALUES ($1, $2)
        ON CONFLICT (product, branch) DO NOTHING
        "#,
    )
    .bind(product)
    .bind(branch)
    .execute(pool)
    .await?;
    Ok(())
}

/// Enable a product branch again. Returns false when it was not disabled.
pub async fn enable_product(pool: &PgPool, product: &str, branch: &str) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM shipit_api_disabled_products WHERE product = $1 AND branch = $2")
            .bind(product)
            .bind(branch)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// Current version of a product channel.
pub async fn get_version(
    pool: &PgPool,
    product: &str,
    channel: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT current_version FROM shipit_api_versions
        WHERE product_name = $1 AND product_channel = $2
        "#,
    )
    .bind(product)
    .bind(channel)
    .fetch_optional(pool)
    .await
}

/// Insert or replace the current version of a product channel.
pub async fn set_version(
    pool: &PgPool,
    product: &str,
    channel: &str,
    version: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO shipit_api_versions (product_name, product_channel, current_version)
        VALUES ($1, $2, $3)
        ON CONFLICT (product_name, product_channel)
        DO UPDATE SET current_version = EXCLUDED.current_version
        "#,
    )
    .bind(product)
    .bind(channel)
    .bind(version)
    .execute(pool)
    .await?;
    Ok(())
}

// ============================================================================
// Merge automation
// ============================================================================

/// Fields of a merge automation to create.
#[derive(Debug, Clone)]
pub struct NewMergeAutomation {
    pub product: String,
    pub behavior: String,
    pub revision: String,
    pub version: String,
    pub dry_run: bool,
    pub commit_message: Option<String>,
    pub commit_author: Option<String>,
    pub repo: String,
    pub pretty_name: String,
    pub project: String,
}

pub async fn create_merge_automation(
    pool: &PgPool,
    automation: &NewMergeAutomation,
) -> Result<MergeAutomation, sqlx::Error> {
    sqlx::query_as::<_, MergeAutomation>(
        r#"
        INSERT INTO shipit_api_merge_automation
            (product, behavior, revision, version, dry_run, commit_message, commit_author,
             repo, pretty_name, project, status, created)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending', NOW())
        RETURNING *
        "#,
    )
    .bind(&automation.product)
    .bind(&automation.behavior)
    .bind(&automation.revision)
    .bind(&automation.version)
    .bind(automation.dry_run)
    .bind(&automation.commit_message)
    .bind(&automation.commit_author)
    .bind(&automation.repo)
    .bind(&automation.pretty_name)
    .bind(&automation.project)
    .fetch_one(pool)
    .await
}

/// Latest 20 automations of a product that were not canceled; completed
/// ones sort last.
pub async fn list_merge_automations(
    pool: &PgPool,
    product: &str,
) -> Result<Vec<MergeAutomation>, sqlx::Error> {
    sqlx::query_as::<_, MergeAutomation>(
        r#"
        SELECT * FROM shipit_api_merge_automation
        WHERE product = $1 AND status <> 'canceled'
        ORDER BY CASE WHEN status = 'completed' THEN 1 ELSE 0 END, created DESC
        LIMIT 20
        "#,
    )
    .bind(product)
    .fetch_all(pool)
    .await
}

pub async fn get_merge_automation(
    pool: &PgPool,
    id: i32,
) -> Result<Option<MergeAutomation>, sqlx::Error> {
    sqlx::query_as::<_, MergeAutomation>("SELECT * FROM shipit_api_merge_automation WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Lock an automation row for the rest of the transaction.
pub async fn lock_merge_automation(
    tx: &mut Transaction<'_, Postgres>,
    id: i32,
) -> Result<Option<MergeAutomation>, sqlx::Error> {
    sqlx::query_as::<_, MergeAutomation>(
        "SELECT * FROM shipit_api_merge_automation WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
}

/// Set an automation's status; `completed` is stamped for completed ones.
pub async fn set_merge_automation_status<'e, E>(
    executor: E,
    id: i32,
    status: TaskStatus,
) -> Result<MergeAutomation, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_as::<_, MergeAutomation>(
        r#"
        UPDATE shipit_api_merge_automation
        SET status = $2,
            completed = CASE WHEN $2 = 'completed' THEN NOW() ELSE completed END
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .fetch_one(executor)
    .await
}

/// Record the task of a started automation and move it to running.
pub async fn set_merge_automation_started(
    tx: &mut Transaction<'_, Postgres>,
    id: i32,
    task_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE shipit_api_merge_automation SET task_id = $2, status = 'running' WHERE id = $1",
    )
    .bind(id)
    .bind(task_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// ============================================================================
// Product details rebuild queue
// ============================================================================

/// Queue a product details rebuild and wake listening workers.
///
/// The notification is delivered when the transaction commits.
pub async fn enqueue_rebuild(pool: &PgPool, payload: &Value) -> Result<i64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO shipit_api_rebuild_requests (payload, requested_at)
        VALUES ($1, NOW())
        RETURNING id
        "#,
    )
    .bind(payload)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("SELECT pg_notify($1, $2)")
        .bind(REBUILD_CHANNEL)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(id)
}

/// Claim pending rebuild requests. Requests claimed long ago by a worker
/// that never finished are claimed again.
pub async fn claim_rebuild_requests(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<RebuildRequest>, sqlx::Error> {
    sqlx::query_as::<_, RebuildRequest>(
        r#"
        UPDATE shipit_api_rebuild_requests
        SET claimed_at = NOW()
        WHERE id IN (
            SELECT id FROM shipit_api_rebuild_requests
            WHERE processed_at IS NULL
              AND (claimed_at IS NULL OR claimed_at < NOW() - make_interval(secs => $2))
            ORDER BY requested_at
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING *
        "#,
    )
    .bind(limit)
    .bind(REBUILD_CLAIM_TIMEOUT_SECS as f64)
    .fetch_all(pool)
    .await
}

/// Mark claimed requests as processed.
pub async fn complete_rebuild_requests(pool: &PgPool, ids: &[i64]) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE shipit_api_rebuild_requests SET processed_at = NOW() WHERE id = ANY($1)")
        .bind(ids)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete requests processed before `cutoff`. Returns the number deleted.
pub async fn prune_rebuild_requests(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM shipit_api_rebuild_requests WHERE processed_at IS NOT NULL AND processed_at < $1",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Hand claimed requests back to the queue.
pub async fn release_rebuild_requests(pool: &PgPool, ids: &[i64]) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE shipit_api_rebuild_requests SET claimed_at = NULL WHERE id = ANY($1)")
        .bind(ids)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn phase(submitted: bool, task_id: &str) -> Phase {
        Phase {
            id: 1,
            release_id: 1,
            name: "promote_firefox".into(),
            submitted,
            task_id: task_id.into(),
            task: json!({}),
            context: json!({}),
            created: Utc.with_ymd_and_hms(2024, 9, 3, 8, 0, 0).unwrap(),
            completed: None,
            completed_by: None,
        }
    }

    #[test]
    fn test_new_uid() {
        for _ in 0..100 {
            let uid = new_uid();
            assert_eq!(uid.len(), 22);
            assert!(!uid.starts_with('-'));
            assert!(
                uid.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            );
        }
        assert_ne!(new_uid(), new_uid());
    }

    #[test]
    fn test_phase_json() {
        let pending = phase(false, "");
        assert!(!pending.skipped());
        let json = pending.to_json();
        assert_eq!(json["actionTaskId"], "");
        assert_eq!(json["completed"], "");
        assert_eq!(json["created"], "2024-09-03T08:00:00.000000Z");

        assert!(phase(true, "").skipped());
        assert!(!phase(true, "abc").skipped());
    }

    #[test]
    fn test_release_json() {
        let release = Release {
            id: 1,
            name: "Firefox-131.0b5-build1".into(),
            product: "firefox".into(),
            version: "131.0b5".into(),
            branch: "releases/mozilla-beta".into(),
            revision: "abc".into(),
            build_number: 1,
            release_eta: None,
            status: "scheduled".into(),
            partial_updates: None,
            product_key: None,
            repo_url: "https://hg.mozilla.org/releases/mozilla-beta".into(),
            created: Utc.with_ymd_and_hms(2024, 9, 3, 8, 0, 0).unwrap(),
            completed: None,
        };
        let json = release.to_json(&[phase(false, "")]);
        assert_eq!(json["project"], "mozilla-beta");
        assert_eq!(json["release_eta"], "");
        assert_eq!(json["allow_phase_skipping"], false);
        assert_eq!(json["phases"][0]["name"], "promote_firefox");

        let record = release.to_record();
        assert_eq!(record.name, "Firefox-131.0b5-build1");
        assert_eq!(record.completed, None);
    }

    #[test]
    fn test_merge_automation_json() {
        let automation = MergeAutomation {
            id: 7,
            product: "firefox".into(),
            behavior: "main-to-beta".into(),
            revision: "abc123".into(),
            version: "130.0".into(),
            dry_run: true,
            commit_message: None,
            commit_author: None,
            repo: "https://hg.mozilla.org/try".into(),
            pretty_name: "Main -> beta".into(),
            project: "try".into(),
            status: "running".into(),
            task_id: None,
            created: Utc.with_ymd_and_hms(2024, 9, 3, 8, 0, 0).unwrap(),
            completed: None,
        };
        assert_eq!(automation.task_status(), TaskStatus::Running);
        let json = automation.to_json();
        assert_eq!(json["completed"], Value::Null);
        assert_eq!(json["task_id"], Value::Null);
        assert_eq!(json["dry_run"], true);
        assert_eq!(json["pretty_name"], "Main -> beta");
    }
}
