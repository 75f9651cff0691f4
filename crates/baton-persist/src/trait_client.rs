use async_trait::async_trait;

use baton_types::{NewRun, NewThread, Run, RunCompletion, RunOutcome, RunStatus, Thread};
use crate::error::Result;

/// Durable store holding threads and runs.
///
/// Every lock-affecting operation is a single-row conditional write: the
/// predicate is evaluated by the store in the same atomic step as the
/// write. A `false` return means no row matched the predicate. None of
/// these operations retry.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Create a new idle thread
    async fn create_thread(&self, input: NewThread) -> Result<Thread>;

    /// Get a thread by ID
    async fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>>;

    /// List threads for a user, most recently updated first
    async fn list_threads(
        &self,
        user_id: &str,
        limit: Option<i64>,
        skip: Option<i64>,
    ) -> Result<Vec<Thread>>;

    /// Count a message appended to the thread
    async fn record_message(&self, thread_id: &str) -> Result<()>;

    /// `run_status: IDLE -> WAITING` where `run_status == IDLE`.
    ///
    /// Also clears `status_message`, `last_run_cancelled` and `last_run_error`.
    async fn acquire_run_lock(&self, thread_id: &str) -> Result<bool>;

    /// Link the thread to `run_id` where the lock is held and not yet linked
    async fn set_current_run_id(&self, thread_id: &str, run_id: &str) -> Result<bool>;

    /// Return a lock that was acquired but never linked to a run.
    ///
    /// Predicate `run_status != IDLE && current_run_id == null`. Used to
    /// compensate when run creation fails; no outcome is stamped.
    async fn release_unlinked_run_lock(&self, thread_id: &str) -> Result<bool>;

    /// Mirror run progress onto the thread where `current_run_id == run_id`
    async fn set_thread_run_status(
        &self,
        thread_id: &str,
        run_id: &str,
        status: RunStatus,
    ) -> Result<bool>;

    /// Release the lock unconditionally and stamp the outcome
    async fn release_run_lock(
        &self,
        thread_id: &str,
        run_id: &str,
        outcome: &RunOutcome,
    ) -> Result<()>;

    /// Release the lock and stamp the outcome where `current_run_id == run_id`
    async fn release_run_lock_if_current(
        &self,
        thread_id: &str,
        run_id: &str,
        outcome: &RunOutcome,
    ) -> Result<bool>;

    /// Insert a run row in `WAITING` status
    async fn create_run(&self, input: NewRun) -> Result<Run>;

    /// Get a run by ID
    async fn get_run(&self, run_id: &str) -> Result<Option<Run>>;

    /// List runs of a thread, newest first
    async fn list_runs(&self, thread_id: &str, limit: Option<i64>) -> Result<Vec<Run>>;

    /// Set a run's own status where `completed_at` is unset.
    ///
    /// Stamps `started_at` on entering `STREAMING`. Errors with
    /// `RunNotFound` when the run does not exist.
    async fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<bool>;

    /// Write terminal fields where `completed_at` is unset (first terminal write wins)
    async fn complete_run(&self, run_id: &str, completion: &RunCompletion) -> Result<bool>;

    /// Check the store is reachable
    async fn health_check(&self) -> Result<()>;
}
