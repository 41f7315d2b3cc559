//! API routes.

use axum::middleware;
use axum::routing::{get, patch, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    create_project, delete_project, generate_commentary, get_artifact, get_job_status,
    get_project, health, job_events, list_projects, ready, start_description, start_video,
    update_options,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging, security_headers};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let project_routes = Router::new()
        .route("/projects", post(create_project).get(list_projects))
        .route("/projects/:project_id", get(get_project).delete(delete_project))
        .route("/projects/:project_id/options", patch(update_options))
        .route("/projects/:project_id/artifacts/:name", get(get_artifact));

    let job_routes = Router::new()
        .route("/projects/:project_id/description", post(start_description))
        .route("/projects/:project_id/commentary", post(generate_commentary))
        .route("/projects/:project_id/video", post(start_video))
        // Polling fallback
        .route("/projects/:project_id/jobs/:kind/status", get(get_job_status))
        // Push channel
        .route("/projects/:project_id/jobs/:kind/events", get(job_events));

    let api_routes = Router::new().merge(project_routes).merge(job_routes);

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
