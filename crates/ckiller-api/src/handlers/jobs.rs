//! Job handlers: start jobs, generate commentary, poll status.
//!
//! Start endpoints validate synchronously and answer `202 Accepted` with the
//! persisted `IDLE` event, so a poll issued right after the response never
//! sees the state of a previous run.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use ckiller_models::{JobEvent, JobKind, ProjectRecord};
use ckiller_worker::WorkerError;
use tracing::info;

use super::{load_project, parse_job_kind, parse_project_id};
use crate::error::ApiResult;
use crate::metrics;
use crate::state::AppState;

fn record_start(kind: JobKind, result: &Result<JobEvent, WorkerError>) {
    match result {
        Ok(_) => metrics::record_job_started(kind.as_str()),
        Err(WorkerError::AlreadyRunning(_)) => metrics::record_job_rejected(kind.as_str()),
        Err(_) => {}
    }
}

/// POST /api/projects/:project_id/description
///
/// Returns:
/// - 202: job started
/// - 400: invalid source URL or options
/// - 404: project not found
/// - 409: a description job is already running
pub async fn start_description(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<(StatusCode, Json<JobEvent>)> {
    let project_id = parse_project_id(&project_id)?;
    let result = state.runner.start_description(&project_id).await;
    record_start(JobKind::Description, &result);
    let event = result?;
    info!(project_id = %project_id, "Started description job");
    Ok((StatusCode::ACCEPTED, Json(event)))
}

/// POST /api/projects/:project_id/video
///
/// Returns:
/// - 202: job started
/// - 400: commentary missing, invalid source URL or options
/// - 404: project not found
/// - 409: a video job is already running
pub async fn start_video(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<(StatusCode, Json<JobEvent>)> {
    let project_id = parse_project_id(&project_id)?;
    let result = state.runner.start_video(&project_id).await;
    record_start(JobKind::Video, &result);
    let event = result?;
    info!(project_id = %project_id, "Started video job");
    Ok((StatusCode::ACCEPTED, Json(event)))
}

/// POST /api/projects/:project_id/commentary
///
/// Generates commentary from the stored description and returns the
/// updated project.
pub async fn generate_commentary(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<ProjectRecord>> {
    let project_id = parse_project_id(&project_id)?;
    Ok(Json(state.runner.generate_commentary(&project_id).await?))
}

/// GET /api/projects/:project_id/jobs/:kind/status
///
/// Polling endpoint: the persisted state of one job and its sequence
/// number.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path((project_id, kind)): Path<(String, String)>,
) -> ApiResult<Json<JobEvent>> {
    let project_id = parse_project_id(&project_id)?;
    let kind = parse_job_kind(&kind)?;
    let record = load_project(&state, &project_id).await?;
    Ok(Json(record.event(kind)))
}
