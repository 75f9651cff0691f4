//! Single-run-per-thread locking and the run lifecycle built on it.
//!
//! [`RunLockManager`] wraps the store's conditional writes one to one.
//! [`RunLifecycle`] sequences them into start, advance and completion,
//! with compensation when a start fails halfway.

pub mod builder;
pub mod cancel;
pub mod error;
pub mod lifecycle;
pub mod lock;

pub use builder::RunLifecycleBuilder;
pub use cancel::CancelRegistry;
pub use error::{LifecycleError, Result};
pub use lifecycle::{CompletionReport, RunLifecycle};
pub use lock::RunLockManager;

pub use tokio_util::sync::CancellationToken;
