use std::sync::Arc;

use baton_persist::RunStore;

use crate::error::{LifecycleError, Result};
use crate::lifecycle::RunLifecycle;

/// Builder for a [`RunLifecycle`]
pub struct RunLifecycleBuilder {
    store: Option<Arc<dyn RunStore>>,
    require_terminal_previous_run: bool,
}

impl RunLifecycleBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            require_terminal_previous_run: true,
        }
    }

    /// Set the store holding threads and runs
    pub fn store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Whether `previous_run_id` must point at a finished run (default: true)
    pub fn require_terminal_previous_run(mut self, required: bool) -> Self {
        self.require_terminal_previous_run = required;
        self
    }

    pub fn build(self) -> Result<RunLifecycle> {
        let store = self
            .store
            .ok_or_else(|| LifecycleError::Config("run store is required".to_string()))?;

        Ok(RunLifecycle::with_options(
            store,
            self.require_terminal_previous_run,
        ))
    }
}

impl Default for RunLifecycleBuilder {
    fn default() -> Self {
        Self::new()
    }
}
