use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use baton_persist::{PersistError, RunStore};
use baton_types::{
    NewRun, Run, RunCompletion, RunErrorInfo, RunOutcome, RunRejection, RunStatus, StartRunInput,
    StartRunResult, StartedRun,
};

use crate::cancel::CancelRegistry;
use crate::error::{LifecycleError, Result};
use crate::lock::RunLockManager;

/// What a completion call actually changed.
///
/// Both flags false means another path already finished this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionReport {
    /// The thread lock was released by this call
    pub lock_released: bool,
    /// This call was the first terminal write on the run row
    pub run_updated: bool,
}

impl CompletionReport {
    pub fn is_noop(&self) -> bool {
        !self.lock_released && !self.run_updated
    }
}

/// Drives a thread through start, advance and completion of its runs.
///
/// `start_run` and `complete_run` are sequences of several store writes.
/// They run on a spawned task, so a caller that stops polling (request
/// timeout, client disconnect) never leaves a sequence half applied.
#[derive(Clone)]
pub struct RunLifecycle {
    inner: Arc<Inner>,
}

struct Inner {
    locks: RunLockManager,
    cancellations: CancelRegistry,
    require_terminal_previous_run: bool,
}

/// Run `fut` to completion even if the returned future is dropped
async fn detached<T, F>(fut: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(fut)
        .await
        .map_err(|e| LifecycleError::Task(e.to_string()))?
}

impl RunLifecycle {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self::with_options(store, true)
    }

    pub(crate) fn with_options(store: Arc<dyn RunStore>, require_terminal_previous_run: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                locks: RunLockManager::new(store),
                cancellations: CancelRegistry::new(),
                require_terminal_previous_run,
            }),
        }
    }

    pub fn locks(&self) -> &RunLockManager {
        &self.inner.locks
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        self.inner.locks.store()
    }

    /// Start a run on a thread.
    ///
    /// Expected refusals come back as `StartRunResult::Rejected`. Errors are
    /// store failures, and `StuckThread` when the lock could not be handed
    /// back after a failed start.
    pub async fn start_run(&self, thread_id: &str, input: StartRunInput) -> Result<StartRunResult> {
        let inner = Arc::clone(&self.inner);
        let thread_id = thread_id.to_string();
        detached(async move { inner.start_run(&thread_id, input).await }).await
    }

    /// Move a run to `STREAMING` and mirror that onto its thread
    pub async fn advance(&self, run_id: &str) -> Result<Run> {
        let run = self
            .inner
            .locks
            .update_run_status(run_id, RunStatus::Streaming)
            .await?;

        let mirrored = self
            .store()
            .set_thread_run_status(&run.thread_id, run_id, RunStatus::Streaming)
            .await?;
        if !mirrored {
            tracing::debug!(thread_id = %run.thread_id, run_id, "run no longer holds the thread lock");
        }

        Ok(run)
    }

    /// Finish a run with the given outcome.
    ///
    /// Releases the thread lock only if this run still holds it, and writes
    /// the run's terminal fields only if no terminal write landed first.
    /// Both writes are always attempted.
    pub async fn complete_run(
        &self,
        thread_id: &str,
        run_id: &str,
        outcome: RunOutcome,
    ) -> Result<CompletionReport> {
        self.finish(thread_id, run_id, outcome, false).await
    }

    /// Signal the run's cancellation token and record a cancelled completion
    pub async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<CompletionReport> {
        self.finish(thread_id, run_id, RunOutcome::cancelled(), true)
            .await
    }

    pub async fn fail_run(
        &self,
        thread_id: &str,
        run_id: &str,
        error: RunErrorInfo,
    ) -> Result<CompletionReport> {
        self.complete_run(thread_id, run_id, RunOutcome::failed(error))
            .await
    }

    /// Token for a run started by this process, until it completes
    pub fn cancellation_token(&self, run_id: &str) -> Option<CancellationToken> {
        self.inner.cancellations.token(run_id)
    }

    pub fn active_runs(&self) -> usize {
        self.inner.cancellations.active_count()
    }

    async fn finish(
        &self,
        thread_id: &str,
        run_id: &str,
        outcome: RunOutcome,
        fire_token: bool,
    ) -> Result<CompletionReport> {
        let inner = Arc::clone(&self.inner);
        let (thread_id, run_id) = (thread_id.to_string(), run_id.to_string());
        detached(async move {
            inner
                .complete_run(&thread_id, &run_id, outcome, fire_token)
                .await
        })
        .await
    }
}

impl Inner {
    fn store(&self) -> &Arc<dyn RunStore> {
        self.locks.store()
    }

    async fn start_run(&self, thread_id: &str, input: StartRunInput) -> Result<StartRunResult> {
        let Some(thread) = self.store().get_thread(thread_id).await? else {
            return Ok(StartRunResult::Rejected(RunRejection::ThreadNotFound));
        };
        let has_messages = thread.has_messages();

        if !self.locks.acquire_run_lock(thread_id).await? {
            // Fresh read: the holder may have linked its run since our snapshot
            let current_run_id = match self.store().get_thread(thread_id).await {
                Ok(Some(latest)) => latest.current_run_id,
                _ => thread.current_run_id,
            };
            tracing::info!(thread_id, ?current_run_id, "run rejected, thread busy");
            return Ok(StartRunResult::Rejected(RunRejection::ConcurrentRun {
                current_run_id,
            }));
        }

        if let Some(previous_run_id) = input.previous_run_id.as_deref() {
            if !self.previous_run_is_valid(thread_id, previous_run_id).await? {
                self.compensate_unlinked(thread_id).await?;
                tracing::info!(thread_id, previous_run_id, "run rejected, invalid previous run");
                return Ok(StartRunResult::Rejected(RunRejection::InvalidPreviousRun));
            }
        }

        let new_run = NewRun {
            thread_id: thread_id.to_string(),
            previous_run_id: input.previous_run_id,
            model: input.model,
            request_params: input.request_params,
            metadata: input.metadata,
        };
        let run = match self.locks.create_run(new_run).await {
            Ok(run) => run,
            Err(err) => {
                tracing::warn!(thread_id, error = %err, "run creation failed, releasing lock");
                self.compensate_unlinked(thread_id).await?;
                return Err(err);
            }
        };

        match self.locks.set_current_run_id(thread_id, &run.id).await {
            Ok(true) => {}
            Ok(false) => {
                // The lock is no longer ours, so there is nothing to release
                self.abandon_run(&run.id).await;
                return Err(LifecycleError::LinkFailed {
                    thread_id: thread_id.to_string(),
                    run_id: run.id,
                });
            }
            Err(err) => {
                tracing::warn!(thread_id, run_id = %run.id, error = %err, "linking run failed, releasing lock");
                self.compensate_after_link_error(thread_id, &run.id).await?;
                self.abandon_run(&run.id).await;
                return Err(err);
            }
        }

        self.cancellations.register(&run.id);
        tracing::info!(thread_id, run_id = %run.id, has_messages, "run started");

        Ok(StartRunResult::Started(StartedRun {
            run_id: run.id,
            thread_id: thread_id.to_string(),
            has_messages,
        }))
    }

    async fn complete_run(
        &self,
        thread_id: &str,
        run_id: &str,
        outcome: RunOutcome,
        fire_token: bool,
    ) -> Result<CompletionReport> {
        match self.store().get_run(run_id).await? {
            None => return Err(LifecycleError::RunNotFound(run_id.to_string())),
            Some(run) if run.thread_id != thread_id => {
                return Err(LifecycleError::ThreadMismatch {
                    run_id: run_id.to_string(),
                    thread_id: thread_id.to_string(),
                });
            }
            Some(_) => {}
        }

        if fire_token && !self.cancellations.cancel(run_id) {
            tracing::debug!(run_id, "no live cancellation token for run");
        }

        let release = self
            .locks
            .release_run_lock_if_current(thread_id, run_id, &outcome)
            .await;
        let completion = RunCompletion::from(&outcome);
        let update = self.store().complete_run(run_id, &completion).await;

        match (release, update) {
            (Ok(lock_released), Ok(run_updated)) => {
                self.cancellations.remove(run_id);
                if !run_updated {
                    tracing::warn!(
                        thread_id,
                        run_id,
                        cancelled = outcome.was_cancelled,
                        "run already terminal, keeping first outcome"
                    );
                }
                let report = CompletionReport {
                    lock_released,
                    run_updated,
                };
                tracing::info!(thread_id, run_id, ?report, "run completed");
                Ok(report)
            }
            (release, update) => {
                // Keep the token while nothing landed so a retry can still fire it
                if release.is_ok() || update.is_ok() {
                    self.cancellations.remove(run_id);
                }
                let thread = release.err().map(|err| match err {
                    LifecycleError::Store(source) => source,
                    other => PersistError::Internal(other.to_string()),
                });
                let run = update.err();
                tracing::error!(thread_id, run_id, ?thread, ?run, "run completion failed");
                Err(LifecycleError::Completion {
                    run_id: run_id.to_string(),
                    thread,
                    run,
                })
            }
        }
    }

    async fn previous_run_is_valid(&self, thread_id: &str, previous_run_id: &str) -> Result<bool> {
        let previous = match self.store().get_run(previous_run_id).await {
            Ok(previous) => previous,
            Err(err) => {
                // Still holding an unlinked lock here
                self.compensate_unlinked(thread_id).await?;
                return Err(err.into());
            }
        };
        Ok(match previous {
            Some(run) if run.thread_id == thread_id => {
                !self.require_terminal_previous_run || run.is_terminal()
            }
            _ => false,
        })
    }

    /// Release a lock acquired but never linked to a run
    async fn compensate_unlinked(&self, thread_id: &str) -> Result<()> {
        match self.locks.release_unlinked_run_lock(thread_id).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::debug!(thread_id, "unlinked lock already gone");
                Ok(())
            }
            Err(LifecycleError::Store(source)) => Err(self.stuck(thread_id, source)),
            Err(other) => Err(other),
        }
    }

    /// After a failed link the write may or may not have landed
    async fn compensate_after_link_error(&self, thread_id: &str, run_id: &str) -> Result<()> {
        let unlinked = match self.locks.release_unlinked_run_lock(thread_id).await {
            Ok(released) => released,
            Err(LifecycleError::Store(source)) => return Err(self.stuck(thread_id, source)),
            Err(other) => return Err(other),
        };
        if unlinked {
            return Ok(());
        }

        let outcome = RunOutcome::failed(RunErrorInfo::new("run could not be linked").with_code("link_failed"));
        match self
            .locks
            .release_run_lock_if_current(thread_id, run_id, &outcome)
            .await
        {
            Ok(_) => Ok(()),
            Err(LifecycleError::Store(source)) => Err(self.stuck(thread_id, source)),
            Err(other) => Err(other),
        }
    }

    /// Best effort: mark an orphaned run as failed so it is not left open
    async fn abandon_run(&self, run_id: &str) {
        let completion = RunCompletion {
            is_cancelled: false,
            error_code: Some("link_failed".to_string()),
            error_message: Some("run could not be linked to its thread".to_string()),
        };
        if let Err(err) = self.store().complete_run(run_id, &completion).await {
            tracing::warn!(run_id, error = %err, "failed to mark orphaned run");
        }
    }

    fn stuck(&self, thread_id: &str, source: PersistError) -> LifecycleError {
        tracing::error!(
            thread_id,
            error = %source,
            "thread stuck in WAITING with no run, operator action required"
        );
        LifecycleError::StuckThread {
            thread_id: thread_id.to_string(),
            source,
        }
    }
}
