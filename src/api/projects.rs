use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::api::{not_found, parse_credential};
use crate::models::{CreateProjectRequest, Project, ProjectStatus, RepositoryReference};
use crate::pipeline::IngestStage;
use crate::state::AppState;

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let projects = state.projects.read().len();
    Json(serde_json::json!({ "status": "ok", "projects": projects }))
}

/// GET /api/projects
pub async fn list_projects(State(state): State<AppState>) -> Json<Vec<Project>> {
    Json(state.projects.read().clone())
}

/// GET /api/projects/:id
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Project>, (StatusCode, String)> {
    state.project(id).map(Json).ok_or_else(not_found)
}

/// POST /api/projects - Track a repository and ingest it in the background
pub async fn create_project(
    State(state): State<AppState>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), (StatusCode, String)> {
    let url = req.url.trim().to_string();
    if url.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "URL is required".to_string()));
    }
    let reference = RepositoryReference::parse(&url)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let project = Project {
        id: Uuid::new_v4(),
        url,
        reference: reference.clone(),
        status: ProjectStatus::Acquiring,
        added_at: Utc::now(),
        indexed_at: None,
        file_count: None,
        indexed_count: 0,
    };

    // Duplicate check, limit and insert under one lock
    {
        let mut projects = state.projects.write();
        if projects.iter().any(|p| p.reference == reference) {
            return Err((
                StatusCode::CONFLICT,
                format!("{reference} ({}) is already tracked", reference.branch),
            ));
        }
        if projects.len() >= state.config.max_projects {
            return Err((
                StatusCode::BAD_REQUEST,
                format!(
                    "Maximum number of projects ({}) reached",
                    state.config.max_projects
                ),
            ));
        }
        projects.push(project.clone());
    }
    state.persist_projects();

    let credential = state.credential(req.token);
    tokio::spawn(run_ingest(state, project.id, reference, credential));

    Ok((StatusCode::CREATED, Json(project)))
}

/// DELETE /api/projects/:id - Remove a project with its embeddings and commits.
/// Refused while an ingestion is running so no records outlive the project.
pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    {
        let mut projects = state.projects.write();
        let project = projects.iter().find(|p| p.id == id).ok_or_else(not_found)?;
        if project.status.is_busy() {
            return Err((
                StatusCode::CONFLICT,
                "Project is being ingested, retry once it finishes".to_string(),
            ));
        }
        projects.retain(|p| p.id != id);
    }

    match state.vectors.delete_project(id) {
        Ok(n) => tracing::info!("Deleted {n} embeddings for {id}"),
        Err(e) => tracing::warn!("Failed to delete embeddings for {id}: {e}"),
    }
    if let Err(e) = state.commits.delete_project(id) {
        tracing::warn!("Failed to delete commits for {id}: {e}");
    }

    state.persist_projects();
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/projects/:id/reindex - Ingest again, replacing records in place
pub async fn reindex_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<(StatusCode, Json<Project>), (StatusCode, String)> {
    let req = parse_credential(&body)?;

    let updated = {
        let mut projects = state.projects.write();
        let project = projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(not_found)?;
        if project.status.is_busy() {
            return Err((
                StatusCode::CONFLICT,
                "Project is already being ingested".to_string(),
            ));
        }
        project.status = ProjectStatus::Acquiring;
        project.clone()
    };
    state.persist_projects();

    let credential = state.credential(req.token);
    tokio::spawn(run_ingest(
        state,
        id,
        updated.reference.clone(),
        credential,
    ));

    Ok((StatusCode::ACCEPTED, Json(updated)))
}

/// GET /api/projects/:id/files - Indexed file names in insertion order
pub async fn list_files(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<String>>, (StatusCode, String)> {
    if state.project(id).is_none() {
        return Err(not_found());
    }
    Ok(Json(state.vectors.file_names(id)))
}

/// Background ingestion. Outcomes are recorded on the project.
pub(crate) async fn run_ingest(
    state: AppState,
    project_id: Uuid,
    reference: RepositoryReference,
    credential: Option<String>,
) {
    let _permit = match state.ingest_semaphore.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            tracing::error!("Ingest semaphore closed, dropping ingestion of {reference}");
            return;
        }
    };

    let stage_state = state.clone();
    let result = state
        .pipeline
        .ingest_with(project_id, &reference, credential.as_deref(), move |stage| {
            let IngestStage::Embedding { file_count, .. } = stage;
            update_project(&stage_state, project_id, |p| {
                p.status = ProjectStatus::Embedding;
                p.file_count = Some(file_count);
            });
        })
        .await;

    match result {
        Ok(report) => {
            tracing::info!(
                "Ingestion of {reference} complete: {} indexed, {} failed",
                report.indexed_count,
                report.failed_count
            );
            let tracked = update_project(&state, project_id, |p| {
                p.status = ProjectStatus::Ready;
                p.reference = report.reference;
                p.file_count = Some(report.file_count);
                p.indexed_count = state.vectors.count(project_id);
                p.indexed_at = Some(Utc::now());
            });
            if !tracked {
                discard_orphans(&state, project_id);
            }
        }
        Err(e) => {
            tracing::error!("Failed to ingest {reference}: {e}");
            update_project(&state, project_id, |p| {
                p.status = ProjectStatus::Failed {
                    reason: e.remediation(),
                    message: e.to_string(),
                };
            });
        }
    }
}

/// Apply `change` to a project if it still exists, then persist.
/// Returns false when the project is gone.
pub(crate) fn update_project(
    state: &AppState,
    id: Uuid,
    change: impl FnOnce(&mut Project),
) -> bool {
    {
        let mut projects = state.projects.write();
        match projects.iter_mut().find(|p| p.id == id) {
            Some(project) => change(project),
            None => return false,
        }
    }
    state.persist_projects();
    true
}

/// Drop records written for a project that was deleted meanwhile.
pub(crate) fn discard_orphans(state: &AppState, id: Uuid) {
    tracing::warn!("Project {id} was removed during processing, discarding its records");
    if let Err(e) = state.vectors.delete_project(id) {
        tracing::warn!("Failed to delete embeddings for {id}: {e}");
    }
    if let Err(e) = state.commits.delete_project(id) {
        tracing::warn!("Failed to delete commits for {id}: {e}");
    }
}
