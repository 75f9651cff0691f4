//! Run lock manager.
//!
//! Thin layer over the store's conditional writes. It never retries: a
//! `false` from the store is handed back to the caller, who decides whether
//! that means "already running", "stale completion" or a hard failure.

use std::sync::Arc;

use baton_persist::RunStore;
use baton_types::{NewRun, Run, RunOutcome, RunStatus};

use crate::error::{LifecycleError, Result};

#[derive(Clone)]
pub struct RunLockManager {
    store: Arc<dyn RunStore>,
}

impl RunLockManager {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    /// Try to take the thread's lock (`IDLE -> WAITING`)
    pub async fn acquire_run_lock(&self, thread_id: &str) -> Result<bool> {
        let acquired = self.store.acquire_run_lock(thread_id).await?;
        if acquired {
            tracing::debug!(thread_id, "run lock acquired");
        } else {
            tracing::debug!(thread_id, "run lock busy");
        }
        Ok(acquired)
    }

    /// Insert the run row. Only valid right after a successful acquire.
    pub async fn create_run(&self, input: NewRun) -> Result<Run> {
        let thread_id = input.thread_id.clone();
        self.store
            .create_run(input)
            .await
            .map_err(|source| LifecycleError::RunCreation { thread_id, source })
    }

    /// Link the locked thread to its run.
    ///
    /// Returns `Ok(false)` if the lock is no longer held unlinked, i.e.
    /// something else took the thread over in the meantime.
    pub async fn set_current_run_id(&self, thread_id: &str, run_id: &str) -> Result<bool> {
        let linked = self.store.set_current_run_id(thread_id, run_id).await?;
        if !linked {
            tracing::warn!(thread_id, run_id, "thread no longer holds an unlinked lock");
        }
        Ok(linked)
    }

    /// Hand back a lock that was never linked to a run
    pub async fn release_unlinked_run_lock(&self, thread_id: &str) -> Result<bool> {
        Ok(self.store.release_unlinked_run_lock(thread_id).await?)
    }

    /// Advance a run's own status. Never touches the thread lock.
    ///
    /// Only forward, non-terminal moves are accepted here; finishing a run
    /// goes through the completion path. Re-applying the current status is
    /// a no-op.
    pub async fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<Run> {
        let run = self
            .store
            .get_run(run_id)
            .await?
            .ok_or_else(|| LifecycleError::RunNotFound(run_id.to_string()))?;

        if run.is_terminal() {
            return Err(LifecycleError::RunCompleted(run_id.to_string()));
        }
        if run.status == status {
            return Ok(run);
        }
        if status == RunStatus::Idle || !run.status.can_advance_to(status) {
            return Err(LifecycleError::InvalidTransition {
                run_id: run_id.to_string(),
                from: run.status,
                to: status,
            });
        }

        if !self.store.update_run_status(run_id, status).await? {
            // Completed between our read and the conditional write
            return Err(LifecycleError::RunCompleted(run_id.to_string()));
        }

        self.store
            .get_run(run_id)
            .await?
            .ok_or_else(|| LifecycleError::RunNotFound(run_id.to_string()))
    }

    /// Release unconditionally. Only safe on single-path code that still owns the lock.
    pub async fn release_run_lock(
        &self,
        thread_id: &str,
        run_id: &str,
        outcome: &RunOutcome,
    ) -> Result<()> {
        self.store.release_run_lock(thread_id, run_id, outcome).await?;
        tracing::debug!(thread_id, run_id, "run lock released");
        Ok(())
    }

    /// Release only if `run_id` still holds the lock
    pub async fn release_run_lock_if_current(
        &self,
        thread_id: &str,
        run_id: &str,
        outcome: &RunOutcome,
    ) -> Result<bool> {
        let released = self
            .store
            .release_run_lock_if_current(thread_id, run_id, outcome)
            .await?;
        if released {
            tracing::debug!(thread_id, run_id, "run lock released");
        } else {
            tracing::debug!(thread_id, run_id, "run lock already released");
        }
        Ok(released)
    }
}
