use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use baton_persist::PersistError;
use baton_runs::LifecycleError;
use baton_types::RunRejection;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Run rejected: {0}")]
    Rejected(RunRejection),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Rejected(ref rejection) => return rejection_response(rejection),
            ApiError::ThreadNotFound(_) | ApiError::RunNotFound(_) => {
                (StatusCode::NOT_FOUND, json!({ "error": self.to_string() }))
            }
            ApiError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, json!({ "error": self.to_string() }))
            }
            ApiError::Persist(PersistError::ThreadNotFound(ref id)) => (
                StatusCode::NOT_FOUND,
                json!({ "error": format!("Thread not found: {id}") }),
            ),
            ApiError::Persist(PersistError::RunNotFound(ref id)) => (
                StatusCode::NOT_FOUND,
                json!({ "error": format!("Run not found: {id}") }),
            ),
            ApiError::Persist(ref e) => {
                tracing::error!("Persistence error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Storage error" }))
            }
            ApiError::Lifecycle(ref e) => lifecycle_status(e),
            ApiError::Config(ref msg) => {
                tracing::error!("Config error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Configuration error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

fn rejection_response(rejection: &RunRejection) -> Response {
    let status = match rejection {
        RunRejection::ThreadNotFound => StatusCode::NOT_FOUND,
        RunRejection::ConcurrentRun { .. } => StatusCode::CONFLICT,
        RunRejection::InvalidPreviousRun => StatusCode::BAD_REQUEST,
    };

    let mut body = json!({
        "error": rejection.user_message(),
        "reason": rejection.reason(),
    });
    if let RunRejection::ConcurrentRun {
        current_run_id: Some(run_id),
    } = rejection
    {
        body["current_run_id"] = json!(run_id);
    }

    (status, Json(body)).into_response()
}

fn lifecycle_status(error: &LifecycleError) -> (StatusCode, serde_json::Value) {
    match error {
        LifecycleError::RunNotFound(_) | LifecycleError::ThreadMismatch { .. } => {
            (StatusCode::NOT_FOUND, json!({ "error": error.to_string() }))
        }
        LifecycleError::RunCompleted(_) | LifecycleError::InvalidTransition { .. } => {
            (StatusCode::CONFLICT, json!({ "error": error.to_string() }))
        }
        LifecycleError::StuckThread { .. } => {
            tracing::error!("Lifecycle error: {}", error);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": "Conversation is temporarily unavailable" }),
            )
        }
        _ => {
            tracing::error!("Lifecycle error: {}", error);
            (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Processing error" }))
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
