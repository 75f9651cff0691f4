pub mod thread;
pub mod run;
pub mod outcome;
pub mod start;

pub use thread::{NewThread, RunStatus, Thread, ThreadMetadata};
pub use run::{NewRun, Run, RunCompletion};
pub use outcome::{RunErrorInfo, RunOutcome};
pub use start::{RunRejection, StartRunInput, StartRunResult, StartedRun};

/// Generate a fresh record identifier
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
