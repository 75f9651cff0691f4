//! # Baton
//!
//! Baton keeps a conversation thread to a single in-flight run. The run lock
//! lives on the thread row and every transition is a conditional write, so
//! the guarantee holds across tasks, processes and replicas sharing a store.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use baton::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let baton = BatonBuilder::new().memory().build().await?;
//!
//!     let thread = baton.store().create_thread(NewThread::new("user-1")).await?;
//!     let started = baton.start_run(&thread.id, StartRunInput::new()).await?;
//!
//!     if let Some(run_id) = started.run_id() {
//!         baton.advance(run_id).await?;
//!         // ... generate ...
//!         baton.complete_run(&thread.id, run_id, RunOutcome::success()).await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Crates
//!
//! - **baton-types**: `Thread`, `Run`, outcomes and start results
//! - **baton-persist**: the `RunStore` trait, memory and MongoDB backends
//! - **baton-runs**: `RunLockManager` and the `RunLifecycle` controller
//!
//! ## Features
//!
//! - `mongodb`: enable the MongoDB store backend

pub use baton_persist as persist;
pub use baton_runs as runs;
pub use baton_types as types;

pub use baton_persist::{MemoryStore, RunStore, StoreBackend};
pub use baton_runs::{CompletionReport, LifecycleError, RunLifecycle, RunLockManager};
pub use baton_types::{RunOutcome, RunRejection, RunStatus, StartRunInput, StartRunResult};

/// High-level builder wiring a store into a lifecycle
pub mod builder;

/// Convenient prelude with commonly used types
pub mod prelude {
    pub use crate::builder::BatonBuilder;
    pub use crate::persist::RunStore;
    pub use crate::runs::{CompletionReport, RunLifecycle};
    pub use crate::types::{
        NewThread, RunErrorInfo, RunOutcome, RunRejection, RunStatus, StartRunInput,
        StartRunResult,
    };
    pub use anyhow::Result;
}
