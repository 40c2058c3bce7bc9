//! Axum handlers. Every handler returns `Result<_, (StatusCode, String)>`.

pub mod ask;
pub mod commits;
pub mod projects;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;

use crate::error::Error;
use crate::models::CredentialRequest;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(projects::health))
        .route(
            "/api/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/api/projects/{id}",
            get(projects::get_project).delete(projects::delete_project),
        )
        .route("/api/projects/{id}/reindex", post(projects::reindex_project))
        .route("/api/projects/{id}/files", get(projects::list_files))
        .route("/api/projects/{id}/ask", post(ask::ask))
        .route("/api/projects/{id}/commits", get(commits::list_commits))
        .route("/api/projects/{id}/commits/poll", post(commits::poll_commits))
        .with_state(state)
}

pub(crate) fn error_response(e: &Error) -> (StatusCode, String) {
    let status = match e {
        Error::InvalidReference(_) | Error::EmptyRepository => StatusCode::BAD_REQUEST,
        Error::RepositoryTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        Error::RepositoryNotFound { .. } | Error::ProjectNotFound(_) => StatusCode::NOT_FOUND,
        Error::Unauthorized { .. } => StatusCode::FORBIDDEN,
        Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        Error::Upstream { .. }
        | Error::Provider { .. }
        | Error::ProviderFailure { .. }
        | Error::NothingIndexed { .. }
        | Error::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

pub(crate) fn not_found() -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, "Project not found".to_string())
}

/// Bodies carrying only an optional token may be omitted entirely.
pub(crate) fn parse_credential(body: &[u8]) -> Result<CredentialRequest, (StatusCode, String)> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(CredentialRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid request body: {e}")))
}
