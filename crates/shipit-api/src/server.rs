// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP routers and serving.
//!
//! The admin API is used by the release UI and automation; the public API
//! serves the same release data read-only without authentication.

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, post};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers::{
    disabled_products, dockerflow, github, merge_automation, permissions, product_details,
    releases, signoffs, versions, xpi,
};
use crate::state::AppState;

/// CORS policy from the configured origins; `*` allows any origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

fn dockerflow_routes() -> Router<AppState> {
    Router::new()
        .route("/__heartbeat__", get(dockerflow::heartbeat))
        .route("/__lbheartbeat__", get(dockerflow::lbheartbeat))
        .route("/__version__", get(dockerflow::version))
}

/// Router of the authenticated admin API.
pub fn admin_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        // Product releases
        .route(
            "/releases",
            get(releases::list_releases).post(releases::add_release),
        )
        .route(
            "/releases/{name}",
            get(releases::get_release)
                .patch(releases::update_release_status)
                .delete(releases::abandon_release),
        )
        .route(
            "/releases/{name}/{phase}",
            get(releases::get_phase).put(releases::schedule_phase),
        )
        .route(
            "/signoff/{name}/{phase}",
            get(signoffs::get_phase_signoffs).patch(signoffs::phase_signoff),
        )
        .route(
            "/disabled-products",
            get(disabled_products::list_disabled_products)
                .post(disabled_products::disable_product)
                .delete(disabled_products::enable_product),
        )
        .route("/versions/{product}/{channel}", get(versions::get_version))
        .route(
            "/product-details",
            post(product_details::rebuild_product_details),
        )
        // XPI releases
        .route(
            "/xpi/releases",
            get(xpi::list_xpi_releases).post(xpi::add_xpi_release),
        )
        .route(
            "/xpi/releases/{name}",
            get(xpi::get_xpi_release)
                .patch(xpi::update_xpi_release_status)
                .delete(xpi::abandon_xpi_release),
        )
        .route(
            "/xpi/releases/{name}/{phase}",
            get(xpi::get_xpi_phase).put(xpi::schedule_xpi_release_phase),
        )
        .route(
            "/xpi/releases/{name}/{phase}/xpi-url",
            get(xpi::get_xpi_url),
        )
        .route(
            "/xpi/signoff/{name}/{phase}",
            get(xpi::get_xpi_phase_signoffs).patch(xpi::xpi_phase_signoff),
        )
        // GitHub
        .route("/github/branches/{owner}/{repo}", get(github::list_branches))
        .route(
            "/github/commits/{owner}/{repo}/{branch}",
            get(github::list_commits),
        )
        .route(
            "/github/xpis/{owner}/{repo}/{revision}",
            get(github::list_xpis),
        )
        .route(
            "/github/file/{owner}/{repo}/{ref}/{*path}",
            get(github::get_file),
        )
        // Merge automation
        .route(
            "/merge-automation/products",
            get(merge_automation::list_products),
        )
        .route(
            "/merge-automation/behaviors/{product}",
            get(merge_automation::list_behaviors),
        )
        .route(
            "/merge-automation",
            get(merge_automation::list_merge_automations)
                .post(merge_automation::submit_merge_automation),
        )
        .route(
            "/merge-automation/{id}",
            axum::routing::delete(merge_automation::cancel_merge_automation),
        )
        .route(
            "/merge-automation/{id}/start",
            post(merge_automation::start_merge_automation),
        )
        .route(
            "/merge-automation/{id}/complete",
            post(merge_automation::mark_merge_automation_completed),
        )
        .route(
            "/merge-automation/{id}/task-status",
            get(merge_automation::get_task_status),
        )
        .route("/__permissions__", get(permissions::get_permissions))
        .merge(dockerflow_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router of the read-only public API.
pub fn public_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .route("/releases", get(releases::list_releases))
        .route("/releases/{name}", get(releases::get_release))
        .route("/releases/{name}/{phase}", get(releases::get_phase))
        .route("/signoff/{name}/{phase}", get(signoffs::get_phase_signoffs))
        .route(
            "/disabled-products",
            get(disabled_products::list_disabled_products),
        )
        .route("/versions/{product}/{channel}", get(versions::get_version))
        .merge(dockerflow_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve a router until `shutdown` resolves.
pub async fn serve<F>(router: Router, addr: SocketAddr, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "HTTP server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
