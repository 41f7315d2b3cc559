//! Project CRUD handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use ckiller_models::{JobKind, NewProject, ProjectId, ProjectOptions, ProjectRecord};
use ckiller_worker::validate_source_url;
use serde::Serialize;
use tracing::{info, warn};

use super::{load_project, parse_project_id};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const MAX_NAME_LENGTH: usize = 200;

/// Project list entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub source_url: String,
    pub description_step: &'static str,
    pub video_step: &'static str,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ProjectRecord> for ProjectSummary {
    fn from(record: &ProjectRecord) -> Self {
        Self {
            id: record.id.to_string(),
            name: record.metadata.name.clone(),
            source_url: record.metadata.source_url.clone(),
            description_step: record.snapshot(JobKind::Description).current_step(),
            video_step: record.snapshot(JobKind::Video).current_step(),
            created_at: record.metadata.created_at,
            updated_at: record.metadata.updated_at,
        }
    }
}

/// POST /api/projects
pub async fn create_project(
    State(state): State<AppState>,
    Json(mut request): Json<NewProject>,
) -> ApiResult<(StatusCode, Json<ProjectRecord>)> {
    request.name = request.name.trim().to_string();
    if request.name.is_empty() || request.name.len() > MAX_NAME_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Project name must be between 1 and {} characters",
            MAX_NAME_LENGTH
        )));
    }
    request.source_url = validate_source_url(
        &request.source_url,
        &state.runner.config().allowed_domains,
    )
    .map_err(ApiError::bad_request)?;
    request.options.validate()?;

    let record = ProjectRecord::new(ProjectId::new(), request);
    state.store.put(&record).await?;
    info!(project_id = %record.id, "Created project");

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/projects
pub async fn list_projects(State(state): State<AppState>) -> ApiResult<Json<Vec<ProjectSummary>>> {
    let records = state.store.list_all().await?;
    Ok(Json(records.iter().map(ProjectSummary::from).collect()))
}

/// GET /api/projects/:project_id
pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<ProjectRecord>> {
    let project_id = parse_project_id(&project_id)?;
    Ok(Json(load_project(&state, &project_id).await?))
}

/// PATCH /api/projects/:project_id/options
///
/// Replaces every option group. Running jobs keep the options they
/// started with.
pub async fn update_options(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(options): Json<ProjectOptions>,
) -> ApiResult<Json<ProjectRecord>> {
    let project_id = parse_project_id(&project_id)?;
    options.validate()?;

    let record = state
        .store
        .update(
            &project_id,
            Box::new(move |record: &mut ProjectRecord| record.options = options),
        )
        .await
        .map_err(|e| match e {
            ckiller_storage::StorageError::NotFound(_) => ApiError::not_found("Project not found"),
            other => other.into(),
        })?;

    Ok(Json(record))
}

/// DELETE /api/projects/:project_id
///
/// Refused while either job of the project is running.
pub async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<StatusCode> {
    let project_id = parse_project_id(&project_id)?;

    for kind in [JobKind::Description, JobKind::Video] {
        if state.runner.is_active(&project_id, kind) {
            return Err(ApiError::conflict(format!("A {} job is running", kind)));
        }
    }

    if !state.store.delete(&project_id).await? {
        return Err(ApiError::not_found("Project not found"));
    }
    if let Err(e) = state.blobs.delete_all(&project_id).await {
        warn!(project_id = %project_id, "Failed to delete project artifacts: {}", e);
    }
    state.hub.close_project(&project_id).await;
    info!(project_id = %project_id, "Deleted project");

    Ok(StatusCode::NO_CONTENT)
}
