//! Request handlers.

pub mod artifacts;
pub mod events;
pub mod health;
pub mod jobs;
pub mod projects;

pub use artifacts::*;
pub use events::*;
pub use health::*;
pub use jobs::*;
pub use projects::*;

use ckiller_models::{JobKind, ProjectId, ProjectRecord};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Validate a project id path segment.
pub(crate) fn parse_project_id(raw: &str) -> ApiResult<ProjectId> {
    if !ProjectId::is_valid(raw) {
        return Err(ApiError::bad_request("Invalid project ID format"));
    }
    Ok(ProjectId::from(raw))
}

pub(crate) fn parse_job_kind(raw: &str) -> ApiResult<JobKind> {
    raw.parse::<JobKind>()
        .map_err(|e| ApiError::bad_request(e.to_string()))
}

pub(crate) async fn load_project(state: &AppState, id: &ProjectId) -> ApiResult<ProjectRecord> {
    state
        .store
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))
}
