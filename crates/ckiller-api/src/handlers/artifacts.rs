//! Artifact downloads.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use ckiller_models::ProjectRecord;
use ckiller_storage::blob::validate_blob_name;
use ckiller_storage::StorageError;

use super::{load_project, parse_project_id};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn content_type(name: &str) -> &'static str {
    let name = name.to_lowercase();
    if name.ends_with(".mp4") {
        "video/mp4"
    } else if name.ends_with(".mp3") {
        "audio/mpeg"
    } else if name.ends_with(".srt") {
        "application/x-subrip"
    } else {
        "application/octet-stream"
    }
}

/// Whether `name` is a published artifact of the project. The final video
/// is only served once the video job completed.
fn is_published(record: &ProjectRecord, name: &str) -> bool {
    let is_video = record.video_artifact.as_deref() == Some(name);
    (is_video && record.video_state.is_completed())
        || record.audio_artifacts.iter().any(|a| a == name)
}

/// GET /api/projects/:project_id/artifacts/:name
pub async fn get_artifact(
    State(state): State<AppState>,
    Path((project_id, name)): Path<(String, String)>,
) -> ApiResult<Response> {
    let project_id = parse_project_id(&project_id)?;
    validate_blob_name(&name).map_err(|_| ApiError::bad_request("Invalid artifact name"))?;

    let record = load_project(&state, &project_id).await?;
    if !is_published(&record, &name) {
        return Err(ApiError::not_found("Artifact not found"));
    }

    let bytes = state.blobs.load(&project_id, &name).await.map_err(|e| match e {
        StorageError::NotFound(_) => ApiError::not_found("Artifact not found"),
        other => other.into(),
    })?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type(&name))
        .header(header::CONTENT_LENGTH, bytes.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", name),
        )
        .header(header::CACHE_CONTROL, "private, max-age=60")
        .body(Body::from(bytes))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}
