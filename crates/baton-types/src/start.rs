use serde::{Deserialize, Serialize};

/// Caller input for starting a run on a thread
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartRunInput {
    #[serde(default)]
    pub previous_run_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub request_params: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl StartRunInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn continuing(previous_run_id: impl Into<String>) -> Self {
        Self {
            previous_run_id: Some(previous_run_id.into()),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// A run that acquired the thread lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedRun {
    pub run_id: String,
    pub thread_id: String,
    /// Whether the thread already had messages when the run started
    pub has_messages: bool,
}

/// Expected, structured reasons a run could not start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RunRejection {
    ThreadNotFound,
    ConcurrentRun {
        #[serde(skip_serializing_if = "Option::is_none")]
        current_run_id: Option<String>,
    },
    InvalidPreviousRun,
}

impl RunRejection {
    /// Stable machine-readable reason code
    pub fn reason(&self) -> &'static str {
        match self {
            RunRejection::ThreadNotFound => "thread_not_found",
            RunRejection::ConcurrentRun { .. } => "concurrent_run",
            RunRejection::InvalidPreviousRun => "invalid_previous_run",
        }
    }

    /// Message suitable for showing to an end user
    pub fn user_message(&self) -> &'static str {
        match self {
            RunRejection::ThreadNotFound => "conversation not found",
            RunRejection::ConcurrentRun { .. } => {
                "a response is already being generated for this conversation"
            }
            RunRejection::InvalidPreviousRun => {
                "previous run does not belong to this conversation or has not finished"
            }
        }
    }
}

impl std::fmt::Display for RunRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason())
    }
}

/// Result of a start attempt: either started, or rejected with a reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StartRunResult {
    Started(StartedRun),
    Rejected(RunRejection),
}

impl StartRunResult {
    pub fn is_success(&self) -> bool {
        matches!(self, StartRunResult::Started(_))
    }

    pub fn started(&self) -> Option<&StartedRun> {
        match self {
            StartRunResult::Started(run) => Some(run),
            StartRunResult::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&RunRejection> {
        match self {
            StartRunResult::Started(_) => None,
            StartRunResult::Rejected(reason) => Some(reason),
        }
    }

    pub fn run_id(&self) -> Option<&str> {
        self.started().map(|run| run.run_id.as_str())
    }
}
