use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::api::projects::discard_orphans;
use crate::api::{error_response, not_found, parse_credential};
use crate::models::CommitRecord;
use crate::state::AppState;

/// GET /api/projects/:id/commits - Stored commit summaries
pub async fn list_commits(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CommitRecord>>, (StatusCode, String)> {
    if state.project(id).is_none() {
        return Err(not_found());
    }
    Ok(Json(state.commits.list(id)))
}

/// POST /api/projects/:id/commits/poll - Summarize commits not seen before.
/// Responds with the newly stored records only.
pub async fn poll_commits(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<Vec<CommitRecord>>, (StatusCode, String)> {
    let req = parse_credential(&body)?;
    let project = state.project(id).ok_or_else(not_found)?;
    let credential = state.credential(req.token);

    let records = state
        .pipeline
        .poll_commits(id, &project.reference, credential.as_deref())
        .await
        .map_err(|e| {
            tracing::error!("Commit poll for {} failed: {e}", project.reference);
            error_response(&e)
        })?;

    if state.project(id).is_none() {
        discard_orphans(&state, id);
        return Err(not_found());
    }

    tracing::info!("Stored {} new commits for {}", records.len(), project.reference);
    Ok(Json(records))
}
