use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::outcome::{RunErrorInfo, RunOutcome};

/// Run status shared by threads and runs.
///
/// On a [`Thread`] this is the lock: `Idle` means no run holds it.
/// On a [`Run`](crate::Run) `Idle` is the terminal "finished" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Idle,
    Waiting,
    Streaming,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Idle => "IDLE",
            RunStatus::Waiting => "WAITING",
            RunStatus::Streaming => "STREAMING",
        }
    }

    /// Whether a run in this status may move to `next`.
    ///
    /// The run axis only moves forward: `WAITING -> STREAMING -> IDLE`,
    /// with `WAITING -> IDLE` allowed for runs that end before streaming.
    pub fn can_advance_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Waiting, RunStatus::Streaming)
                | (RunStatus::Waiting, RunStatus::Idle)
                | (RunStatus::Streaming, RunStatus::Idle)
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistent conversation thread carrying the run lock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
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
    pub message_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ThreadMetadata {
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Input for creating a thread
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewThread {
    pub user_id: String,
    #[serde(default)]
    pub metadata: ThreadMetadata,
}

impl NewThread {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            metadata: ThreadMetadata::default(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = Some(title.into());
        self
    }
}

impl Thread {
    /// Build an idle thread from creation input
    pub fn from_new(input: NewThread, now: DateTime<Utc>) -> Self {
        Self {
            id: crate::new_id(),
            user_id: input.user_id,
            created_at: now,
            updated_at: now,
            metadata: input.metadata,
            run_status: RunStatus::Idle,
            current_run_id: None,
            status_message: None,
            last_run_cancelled: None,
            last_run_error: None,
            pending_tool_call_ids: None,
            last_completed_run_id: None,
            message_count: 0,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.run_status != RunStatus::Idle
    }

    pub fn has_messages(&self) -> bool {
        self.message_count > 0
    }

    /// Apply the field changes of a successful lock acquisition.
    ///
    /// Callers must already have checked `run_status == Idle` under the
    /// same atomic write.
    pub fn apply_acquire(&mut self, now: DateTime<Utc>) {
        self.run_status = RunStatus::Waiting;
        self.current_run_id = None;
        self.status_message = None;
        self.last_run_cancelled = None;
        self.last_run_error = None;
        self.updated_at = now;
    }

    /// Apply the field changes of a lock release, stamping the outcome
    pub fn apply_release(&mut self, run_id: &str, outcome: &RunOutcome, now: DateTime<Utc>) {
        self.run_status = RunStatus::Idle;
        self.current_run_id = None;
        self.last_run_cancelled = Some(outcome.was_cancelled);
        self.last_run_error = outcome.error.clone();
        self.pending_tool_call_ids = outcome.pending_tool_call_ids.clone();
        self.last_completed_run_id = Some(run_id.to_string());
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_moves_forward() {
        assert!(RunStatus::Waiting.can_advance_to(RunStatus::Streaming));
        assert!(RunStatus::Waiting.can_advance_to(RunStatus::Idle));
        assert!(RunStatus::Streaming.can_advance_to(RunStatus::Idle));

        assert!(!RunStatus::Streaming.can_advance_to(RunStatus::Waiting));
        assert!(!RunStatus::Idle.can_advance_to(RunStatus::Streaming));
        assert!(!RunStatus::Waiting.can_advance_to(RunStatus::Waiting));
    }

    #[test]
    fn release_clears_lock_and_records_outcome() {
        let now = Utc::now();
        let mut thread = Thread::from_new(NewThread::new("u1"), now);
        thread.apply_acquire(now);
        thread.current_run_id = Some("r1".to_string());
        assert!(thread.is_locked());

        let outcome = RunOutcome::cancelled().with_pending_tool_calls(vec!["call_1".into()]);
        thread.apply_release("r1", &outcome, now);

        assert_eq!(thread.run_status, RunStatus::Idle);
        assert_eq!(thread.current_run_id, None);
        assert_eq!(thread.last_run_cancelled, Some(true));
        assert_eq!(thread.last_completed_run_id.as_deref(), Some("r1"));
        assert_eq!(thread.pending_tool_call_ids, Some(vec!["call_1".to_string()]));
    }

    #[test]
    fn acquire_clears_previous_outcome() {
        let now = Utc::now();
        let mut thread = Thread::from_new(NewThread::new("u1"), now);
        thread.status_message = Some("thinking".into());
        thread.last_run_cancelled = Some(true);
        thread.last_run_error = Some(RunErrorInfo::new("boom"));

        thread.apply_acquire(now);

        assert_eq!(thread.run_status, RunStatus::Waiting);
        assert!(thread.status_message.is_none());
        assert!(thread.last_run_cancelled.is_none());
        assert!(thread.last_run_error.is_none());
    }
}
