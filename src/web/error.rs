use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::quiz::SessionError;

#[derive(Debug, Error)]
pub enum WebError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Upstream failure: {0}")]
    Upstream(String),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl From<SessionError> for WebError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::OptionOutOfRange { .. } => WebError::BadRequest(err.to_string()),
            SessionError::InvalidTransition { .. }
            | SessionError::NoCurrentQuestion
            | SessionError::Busy
            | SessionError::Cancelled => WebError::Conflict(err.to_string()),
            SessionError::Failed(failure) => WebError::Upstream(failure.message),
            SessionError::Unavailable => WebError::InternalServerError(err.to_string()),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            WebError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            WebError::SessionNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("Session {} not found", id))
            }
            WebError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            WebError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            WebError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T, E = WebError> = std::result::Result<T, E>;
