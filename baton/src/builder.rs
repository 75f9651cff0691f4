use anyhow::{Context, Result};

use baton_persist::{StoreBackend, StoreBuilder};
use baton_runs::{RunLifecycle, RunLifecycleBuilder};

/// Builds a [`RunLifecycle`] together with its store
///
/// # Example
///
/// ```rust,no_run
/// use baton::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() -> Result<()> {
/// let lifecycle = BatonBuilder::new()
///     .mongodb("mongodb://localhost:27017", "baton")
///     .require_terminal_previous_run(true)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct BatonBuilder {
    backend: StoreBackend,
    require_terminal_previous_run: bool,
}

impl Default for BatonBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BatonBuilder {
    /// Memory store, terminal previous runs required
    pub fn new() -> Self {
        Self {
            backend: StoreBackend::Memory,
            require_terminal_previous_run: true,
        }
    }

    pub fn memory(mut self) -> Self {
        self.backend = StoreBackend::Memory;
        self
    }

    /// Use MongoDB (needs the `mongodb` feature)
    pub fn mongodb(mut self, uri: impl Into<String>, database: impl Into<String>) -> Self {
        self.backend = StoreBackend::Mongo {
            uri: uri.into(),
            database: database.into(),
        };
        self
    }

    pub fn require_terminal_previous_run(mut self, required: bool) -> Self {
        self.require_terminal_previous_run = required;
        self
    }

    pub async fn build(self) -> Result<RunLifecycle> {
        let store = StoreBuilder::new()
            .backend(self.backend)
            .build()
            .await
            .context("Failed to build run store")?;

        RunLifecycleBuilder::new()
            .store(store)
            .require_terminal_previous_run(self.require_terminal_previous_run)
            .build()
            .context("Failed to build run lifecycle")
    }
}
