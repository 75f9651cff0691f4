use std::sync::Arc;

use baton_persist::RunStore;
use baton_runs::{RunLifecycle, RunLifecycleBuilder};

use crate::config::Config;
use crate::error::{ApiError, ApiResult};

/// Shared application state passed to all handlers
///
/// The lifecycle owns the cancellation tokens of runs started by this
/// process, so it is created once at startup and shared.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn RunStore>,
    pub lifecycle: Arc<RunLifecycle>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn RunStore>) -> ApiResult<Self> {
        let lifecycle = RunLifecycleBuilder::new()
            .store(store.clone())
            .require_terminal_previous_run(config.runs.require_terminal_previous_run)
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            store,
            lifecycle: Arc::new(lifecycle),
        })
    }
}
