use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::job::JobStatus;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("stale transition: job is {current:?}")]
    StaleTransition { current: JobStatus },

    #[error("offer expired")]
    OfferExpired,

    #[error("job no longer available")]
    JobNoLongerAvailable,

    #[error("agent already engaged on another job")]
    AgentEngaged,

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            DispatchError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            DispatchError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            DispatchError::StaleTransition { current } => (
                StatusCode::CONFLICT,
                format!("stale transition: job is {current:?}"),
            ),
            DispatchError::OfferExpired => (StatusCode::GONE, "offer expired".to_string()),
            DispatchError::JobNoLongerAvailable => {
                (StatusCode::CONFLICT, "job no longer available".to_string())
            }
            DispatchError::AgentEngaged => (
                StatusCode::CONFLICT,
                "agent already engaged on another job".to_string(),
            ),
            DispatchError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
