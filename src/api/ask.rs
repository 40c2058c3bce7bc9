use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures_util::stream::{self, Stream, StreamExt};
use uuid::Uuid;

use crate::api::not_found;
use crate::llm::prompts::{sanitize_for_prompt, truncate_chars};
use crate::models::{AskRequest, ProjectStatus, ReferencedFile};
use crate::pipeline::AnswerChunk;
use crate::state::AppState;

const MAX_QUESTION_LEN: usize = 2000;

/// POST /api/projects/:id/ask - Answer a question over SSE.
///
/// Events: `context` once, then `delta`s, or a `complete` that replaces
/// earlier deltas, or an `error`; `done` always closes the stream.
pub async fn ask(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AskRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Question is required".to_string()));
    }
    let question = sanitize_for_prompt(truncate_chars(question, MAX_QUESTION_LEN));

    let project = state.project(id).ok_or_else(not_found)?;
    if project.status != ProjectStatus::Ready {
        return Err((
            StatusCode::CONFLICT,
            "Project is not ready for questions".to_string(),
        ));
    }

    let permit = state
        .ask_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Question service at capacity".to_string(),
            )
        })?;

    let answer = state.pipeline.ask(id, &question).await;

    let files: Vec<ReferencedFile> = answer.references.iter().map(ReferencedFile::from).collect();
    let context_event = event(
        "context",
        serde_json::json!({ "files": files, "kind": answer.kind }),
    );

    let chunk_events = answer.stream.map(|chunk| {
        Ok::<_, Infallible>(match chunk {
            Ok(AnswerChunk::Delta(content)) => {
                event("delta", serde_json::json!({ "content": content }))
            }
            Ok(AnswerChunk::Complete(content)) => {
                event("complete", serde_json::json!({ "content": content }))
            }
            Err(e) => event("error", serde_json::json!({ "message": e.to_string() })),
        })
    });

    let done_event: Result<Event, Infallible> = Ok(event("done", serde_json::json!({})));
    let event_stream = stream::once(async move { Ok::<_, Infallible>(context_event) })
        .chain(chunk_events)
        .chain(stream::once(async move { done_event }));

    // Hold the semaphore permit for the lifetime of the stream
    let event_stream = event_stream.map(move |item| {
        let _permit = &permit;
        item
    });

    Ok(Sse::new(event_stream))
}

fn event(name: &str, payload: serde_json::Value) -> Event {
    Event::default().event(name).data(payload.to_string())
}
