use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use baton_types::{NewThread, RunErrorInfo, RunStatus, Thread, ThreadMetadata};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateThreadRequest {
    pub user_id: String,
    #[serde(default)]
    pub metadata: ThreadMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadResponse {
    pub thread_id: String,
    pub user_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub metadata: ThreadMetadata,
    pub run_status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_completed_run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_cancelled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_error: Option<RunErrorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_tool_call_ids: Option<Vec<String>>,
    pub message_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct ListThreadsQuery {
    pub user_id: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub skip: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub struct ListThreadsResponse {
    pub threads: Vec<ThreadResponse>,
    pub has_more: bool,
}

/// Create a new thread
pub async fn create_thread(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateThreadRequest>,
) -> ApiResult<(StatusCode, Json<ThreadResponse>)> {
    if req.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("user_id must not be empty".to_string()));
    }

    let thread = state
        .store
        .create_thread(NewThread {
            user_id: req.user_id,
            metadata: req.metadata,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(thread_to_response(thread))))
}

/// List threads for a user
pub async fn list_threads(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListThreadsQuery>,
) -> ApiResult<Json<ListThreadsResponse>> {
    let limit = query.limit.clamp(1, 100);

    let threads = state
        .store
        .list_threads(&query.user_id, Some(limit), Some(query.skip.max(0)))
        .await?;

    let has_more = threads.len() as i64 == limit;
    let threads = threads.into_iter().map(thread_to_response).collect();

    Ok(Json(ListThreadsResponse { threads, has_more }))
}

/// Get a specific thread by ID
pub async fn get_thread(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> ApiResult<Json<ThreadResponse>> {
    let thread = state
        .store
        .get_thread(&thread_id)
        .await?
        .ok_or(ApiError::ThreadNotFound(thread_id))?;

    Ok(Json(thread_to_response(thread)))
}

/// Record that a message was appended to the thread
pub async fn record_message(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> ApiResult<Json<ThreadResponse>> {
    state.store.record_message(&thread_id).await?;

    let thread = state
        .store
        .get_thread(&thread_id)
        .await?
        .ok_or(ApiError::ThreadNotFound(thread_id))?;

    Ok(Json(thread_to_response(thread)))
}

fn thread_to_response(thread: Thread) -> ThreadResponse {
    ThreadResponse {
        thread_id: thread.id,
        user_id: thread.user_id,
        created_at: thread.created_at,
        updated_at: thread.updated_at,
        metadata: thread.metadata,
        run_status: thread.run_status,
        current_run_id: thread.current_run_id,
        last_completed_run_id: thread.last_completed_run_id,
        last_run_cancelled: thread.last_run_cancelled,
        last_run_error: thread.last_run_error,
        pending_tool_call_ids: thread.pending_tool_call_ids,
        message_count: thread.message_count,
    }
}
