use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use baton_types::{Run, RunErrorInfo, RunStatus, Thread, ThreadMetadata};

/// MongoDB-specific Thread document.
///
/// Nullable lock fields are always written (never skipped) so that
/// filters such as `{ current_run_id: null }` match reliably.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoThread {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: ThreadMetadata,
    pub run_status: RunStatus,
    pub current_run_id: Option<String>,
    pub status_message: Option<String>,
    pub last_run_cancelled: Option<bool>,
    pub last_run_error: Option<RunErrorInfo>,
    pub pending_tool_call_ids: Option<Vec<String>>,
    pub last_completed_run_id: Option<String>,
    #[serde(default)]
    pub message_count: i64,
}

/// MongoDB-specific Run document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRun {
    #[serde(rename = "_id")]
    pub id: String,
    pub thread_id: String,
    pub previous_run_id: Option<String>,
    pub status: RunStatus,
    pub model: Option<String>,
    pub request_params: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
    pub is_cancelled: bool,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

// Conversions between database-agnostic and MongoDB-specific models

impl From<Thread> for MongoThread {
    fn from(thread: Thread) -> Self {
        Self {
            id: thread.id,
            user_id: thread.user_id,
            created_at: thread.created_at,
            updated_at: thread.updated_at,
            metadata: thread.metadata,
            run_status: thread.run_status,
            current_run_id: thread.current_run_id,
            status_message: thread.status_message,
            last_run_cancelled: thread.last_run_cancelled,
            last_run_error: thread.last_run_error,
            pending_tool_call_ids: thread.pending_tool_call_ids,
            last_completed_run_id: thread.last_completed_run_id,
            message_count: i64::try_from(thread.message_count).unwrap_or(i64::MAX),
        }
    }
}

impl From<MongoThread> for Thread {
    fn from(thread: MongoThread) -> Self {
        Self {
            id: thread.id,
            user_id: thread.user_id,
            created_at: thread.created_at,
            updated_at: thread.updated_at,
            metadata: thread.metadata,
            run_status: thread.run_status,
            current_run_id: thread.current_run_id,
            status_message: thread.status_message,
            last_run_cancelled: thread.last_run_cancelled,
            last_run_error: thread.last_run_error,
            pending_tool_call_ids: thread.pending_tool_call_ids,
            last_completed_run_id: thread.last_completed_run_id,
            message_count: thread.message_count.max(0) as u64,
        }
    }
}

impl From<Run> for MongoRun {
    fn from(run: Run) -> Self {
        Self {
            id: run.id,
            thread_id: run.thread_id,
            previous_run_id: run.previous_run_id,
            status: run.status,
            model: run.model,
            request_params: run.request_params,
            metadata: run.metadata,
            is_cancelled: run.is_cancelled,
            error_code: run.error_code,
            error_message: run.error_message,
            created_at: run.created_at,
            started_at: run.started_at,
            completed_at: run.completed_at,
            updated_at: run.updated_at,
        }
    }
}

impl From<MongoRun> for Run {
    fn from(run: MongoRun) -> Self {
        Self {
            id: run.id,
            thread_id: run.thread_id,
            previous_run_id: run.previous_run_id,
            status: run.status,
            model: run.model,
            request_params: run.request_params,
            metadata: run.metadata,
            is_cancelled: run.is_cancelled,
            error_code: run.error_code,
            error_message: run.error_message,
            created_at: run.created_at,
            started_at: run.started_at,
            completed_at: run.completed_at,
            updated_at: run.updated_at,
        }
    }
}
