use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::outcome::RunOutcome;
use crate::thread::RunStatus;

/// One generation attempt attached to a thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub previous_run_id: Option<String>,
    pub status: RunStatus,

    // Opaque generation configuration
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

/// Input for inserting a run row
#[derive(Debug, Clone, Default)]
pub struct NewRun {
    pub thread_id: String,
    pub previous_run_id: Option<String>,
    pub model: Option<String>,
    pub request_params: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
}

/// Terminal fields written onto a run row.
///
/// Applied at most once per run; see [`Run::apply_completion`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunCompletion {
    pub is_cancelled: bool,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl From<&RunOutcome> for RunCompletion {
    fn from(outcome: &RunOutcome) -> Self {
        Self {
            is_cancelled: outcome.was_cancelled,
            error_code: outcome.error.as_ref().and_then(|e| e.code.clone()),
            error_message: outcome.error.as_ref().map(|e| e.message.clone()),
        }
    }
}

impl Run {
    /// Build a waiting run from insertion input
    pub fn from_new(input: NewRun, now: DateTime<Utc>) -> Self {
        Self {
            id: crate::new_id(),
            thread_id: input.thread_id,
            previous_run_id: input.previous_run_id,
            status: RunStatus::Waiting,
            model: input.model,
            request_params: input.request_params,
            metadata: input.metadata,
            is_cancelled: false,
            error_code: None,
            error_message: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    /// A run is immutable once `completed_at` is set
    pub fn is_terminal(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn apply_status(&mut self, status: RunStatus, now: DateTime<Utc>) {
        if status == RunStatus::Streaming && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.status = status;
        self.updated_at = now;
    }

    pub fn apply_completion(&mut self, completion: &RunCompletion, now: DateTime<Utc>) {
        self.status = RunStatus::Idle;
        self.is_cancelled = completion.is_cancelled;
        self.error_code = completion.error_code.clone();
        self.error_message = completion.error_message.clone();
        self.completed_at = Some(now);
        self.updated_at = now;
    }
}
