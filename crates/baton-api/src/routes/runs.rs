use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use baton_runs::CompletionReport;
use baton_types::{Run, RunOutcome, StartRunInput, StartRunResult, StartedRun};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct ListRunsResponse {
    pub runs: Vec<Run>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub run_id: String,
    pub lock_released: bool,
    pub run_updated: bool,
}

/// Start a run on a thread
///
/// 201 with the run id, or 404/409/400 for the three rejection reasons.
pub async fn start_run(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
    Json(input): Json<StartRunInput>,
) -> ApiResult<(StatusCode, Json<StartedRun>)> {
    match state.lifecycle.start_run(&thread_id, input).await? {
        StartRunResult::Started(started) => Ok((StatusCode::CREATED, Json(started))),
        StartRunResult::Rejected(rejection) => Err(ApiError::Rejected(rejection)),
    }
}

pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
    Query(query): Query<ListRunsQuery>,
) -> ApiResult<Json<ListRunsResponse>> {
    if state.store.get_thread(&thread_id).await?.is_none() {
        return Err(ApiError::ThreadNotFound(thread_id));
    }

    let runs = state
        .store
        .list_runs(&thread_id, Some(query.limit.clamp(1, 200)))
        .await?;

    Ok(Json(ListRunsResponse { runs }))
}

pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<Run>> {
    let run = state
        .store
        .get_run(&run_id)
        .await?
        .ok_or(ApiError::RunNotFound(run_id))?;

    Ok(Json(run))
}

/// Mark a run as streaming
pub async fn advance_run(
    State(state): State<Arc<AppState>>,
    Path((thread_id, run_id)): Path<(String, String)>,
) -> ApiResult<Json<Run>> {
    run_on_thread(&state, &thread_id, &run_id).await?;
    let run = state.lifecycle.advance(&run_id).await?;
    Ok(Json(run))
}

/// Finish a run; the body is the outcome (empty object for success)
pub async fn complete_run(
    State(state): State<Arc<AppState>>,
    Path((thread_id, run_id)): Path<(String, String)>,
    Json(outcome): Json<RunOutcome>,
) -> ApiResult<Json<CompletionResponse>> {
    let report = state
        .lifecycle
        .complete_run(&thread_id, &run_id, outcome)
        .await?;
    Ok(Json(completion_response(run_id, report)))
}

pub async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path((thread_id, run_id)): Path<(String, String)>,
) -> ApiResult<Json<CompletionResponse>> {
    let report = state.lifecycle.cancel_run(&thread_id, &run_id).await?;
    Ok(Json(completion_response(run_id, report)))
}

/// Runs are addressed through their thread; a mismatch is a 404
async fn run_on_thread(state: &AppState, thread_id: &str, run_id: &str) -> ApiResult<Run> {
    match state.store.get_run(run_id).await? {
        Some(run) if run.thread_id == thread_id => Ok(run),
        _ => Err(ApiError::RunNotFound(run_id.to_string())),
    }
}

fn completion_response(run_id: String, report: CompletionReport) -> CompletionResponse {
    CompletionResponse {
        run_id,
        lock_released: report.lock_released,
        run_updated: report.run_updated,
    }
}
