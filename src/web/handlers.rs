use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{Result as WebResult, WebError};
use crate::quiz::{AnswerOutcome, SessionSnapshot};
use crate::sessions::SessionHandle;
use crate::state::AppState;

#[derive(Serialize, Debug)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
}

#[derive(Deserialize, Debug)]
pub struct LoadContentRequest {
    pub url: String,
}

#[derive(Deserialize, Debug)]
pub struct SubmitAnswerRequest {
    pub option_index: usize,
}

#[derive(Serialize, Debug)]
pub struct SubmitAnswerResponse {
    pub outcome: AnswerOutcome,
    pub session: SessionSnapshot,
}

async fn find_session(app_state: &AppState, session_id: Uuid) -> WebResult<SessionHandle> {
    app_state
        .sessions
        .get_session(session_id)
        .await
        .ok_or(WebError::SessionNotFound(session_id))
}

pub async fn health_handler() -> &'static str {
    "ok"
}

pub async fn create_session_handler(
    State(app_state): State<AppState>,
) -> WebResult<(StatusCode, Json<CreateSessionResponse>)> {
    let handle = app_state.sessions.create_session().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to create session");
        WebError::InternalServerError(e)
    })?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: handle.session_id,
        }),
    ))
}

#[tracing::instrument(skip(app_state))]
pub async fn get_session_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> WebResult<Json<SessionSnapshot>> {
    let session = find_session(&app_state, session_id).await?;
    Ok(Json(session.snapshot().await?))
}

#[tracing::instrument(skip(app_state, payload), fields(content.url = %payload.url))]
pub async fn load_content_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<LoadContentRequest>,
) -> WebResult<Json<SessionSnapshot>> {
    if payload.url.trim().is_empty() {
        return Err(WebError::BadRequest("url must not be empty".to_string()));
    }
    let session = find_session(&app_state, session_id).await?;
    Ok(Json(session.load_content(payload.url).await?))
}

#[tracing::instrument(skip(app_state))]
pub async fn submit_answer_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> WebResult<Json<SubmitAnswerResponse>> {
    let session = find_session(&app_state, session_id).await?;
    let (outcome, snapshot) = session.submit_answer(payload.option_index).await?;
    Ok(Json(SubmitAnswerResponse {
        outcome,
        session: snapshot,
    }))
}

#[tracing::instrument(skip(app_state))]
pub async fn next_question_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> WebResult<Json<SessionSnapshot>> {
    let session = find_session(&app_state, session_id).await?;
    Ok(Json(session.request_next().await?))
}

#[tracing::instrument(skip(app_state))]
pub async fn stop_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> WebResult<Json<SessionSnapshot>> {
    let session = find_session(&app_state, session_id).await?;
    Ok(Json(session.stop().await?))
}

#[tracing::instrument(skip(app_state))]
pub async fn reset_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> WebResult<Json<SessionSnapshot>> {
    let session = find_session(&app_state, session_id).await?;
    Ok(Json(session.reset().await?))
}

#[tracing::instrument(skip(app_state))]
pub async fn delete_session_handler(
    State(app_state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> WebResult<StatusCode> {
    let removed = app_state
        .sessions
        .remove_session(session_id)
        .await
        .map_err(WebError::InternalServerError)?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(WebError::SessionNotFound(session_id))
    }
}
