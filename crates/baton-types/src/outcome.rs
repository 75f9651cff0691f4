use serde::{Deserialize, Serialize};

/// Structured error recorded for a failed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunErrorInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

impl RunErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl std::fmt::Display for RunErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// How a run ended, stamped onto the thread when the lock is released
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunOutcome {
    #[serde(default)]
    pub was_cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunErrorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_tool_call_ids: Option<Vec<String>>,
}

impl RunOutcome {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn cancelled() -> Self {
        Self {
            was_cancelled: true,
            ..Self::default()
        }
    }

    pub fn failed(error: RunErrorInfo) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn with_pending_tool_calls(mut self, ids: Vec<String>) -> Self {
        self.pending_tool_call_ids = Some(ids);
        self
    }
}
