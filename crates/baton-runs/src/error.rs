use thiserror::Error;

use baton_persist::PersistError;
use baton_types::RunStatus;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Store error: {0}")]
    Store(#[from] PersistError),

    #[error("Failed to create run for thread {thread_id}: {source}")]
    RunCreation {
        thread_id: String,
        #[source]
        source: PersistError,
    },

    #[error("Thread {thread_id} lock was taken over before run {run_id} could be linked")]
    LinkFailed { thread_id: String, run_id: String },

    #[error("Thread {thread_id} is stuck holding an orphaned run lock: {source}")]
    StuckThread {
        thread_id: String,
        #[source]
        source: PersistError,
    },

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Run {0} has already completed")]
    RunCompleted(String),

    #[error("Run {run_id} does not belong to thread {thread_id}")]
    ThreadMismatch { run_id: String, thread_id: String },

    #[error("Lifecycle task failed: {0}")]
    Task(String),

    #[error("Invalid transition for run {run_id}: {from} -> {to}")]
    InvalidTransition {
        run_id: String,
        from: RunStatus,
        to: RunStatus,
    },

    #[error("Completion of run {run_id} failed (thread release: {thread:?}, run update: {run:?})")]
    Completion {
        run_id: String,
        thread: Option<PersistError>,
        run: Option<PersistError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
