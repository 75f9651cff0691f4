#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use baton_persist::error::Result;
use baton_persist::{MemoryStore, PersistError, RunStore};
use baton_types::{NewRun, NewThread, Run, RunCompletion, RunOutcome, RunStatus, Thread};

pub const SLOW_WRITE: Duration = Duration::from_millis(200);

/// Memory store with switches to make individual writes fail or stall
#[derive(Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
    pub fail_create_run: AtomicBool,
    pub fail_link: AtomicBool,
    pub fail_release: AtomicBool,
    pub fail_complete_run: AtomicBool,
    pub slow_create_run: AtomicBool,
    pub slow_complete_run: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(PersistError::Unavailable(format!("{what} refused")));
        }
        Ok(())
    }

    async fn stall(flag: &AtomicBool) {
        if flag.load(Ordering::SeqCst) {
            tokio::time::sleep(SLOW_WRITE).await;
        }
    }
}

#[async_trait]
impl RunStore for FailingStore {
    async fn create_thread(&self, input: NewThread) -> Result<Thread> {
        self.inner.create_thread(input).await
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>> {
        self.inner.get_thread(thread_id).await
    }

    async fn list_threads(
        &self,
        user_id: &str,
        limit: Option<i64>,
        skip: Option<i64>,
    ) -> Result<Vec<Thread>> {
        self.inner.list_threads(user_id, limit, skip).await
    }

    async fn record_message(&self, thread_id: &str) -> Result<()> {
        self.inner.record_message(thread_id).await
    }

    async fn acquire_run_lock(&self, thread_id: &str) -> Result<bool> {
        self.inner.acquire_run_lock(thread_id).await
    }

    async fn set_current_run_id(&self, thread_id: &str, run_id: &str) -> Result<bool> {
        Self::check(&self.fail_link, "link")?;
        self.inner.set_current_run_id(thread_id, run_id).await
    }

    async fn release_unlinked_run_lock(&self, thread_id: &str) -> Result<bool> {
        Self::check(&self.fail_release, "release")?;
        self.inner.release_unlinked_run_lock(thread_id).await
    }

    async fn set_thread_run_status(
        &self,
        thread_id: &str,
        run_id: &str,
        status: RunStatus,
    ) -> Result<bool> {
        self.inner.set_thread_run_status(thread_id, run_id, status).await
    }

    async fn release_run_lock(
        &self,
        thread_id: &str,
        run_id: &str,
        outcome: &RunOutcome,
    ) -> Result<()> {
        Self::check(&self.fail_release, "release")?;
        self.inner.release_run_lock(thread_id, run_id, outcome).await
    }

    async fn release_run_lock_if_current(
        &self,
        thread_id: &str,
        run_id: &str,
        outcome: &RunOutcome,
    ) -> Result<bool> {
        Self::check(&self.fail_release, "release")?;
        self.inner
            .release_run_lock_if_current(thread_id, run_id, outcome)
            .await
    }

    async fn create_run(&self, input: NewRun) -> Result<Run> {
        Self::stall(&self.slow_create_run).await;
        Self::check(&self.fail_create_run, "create_run")?;
        self.inner.create_run(input).await
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<Run>> {
        self.inner.get_run(run_id).await
    }

    async fn list_runs(&self, thread_id: &str, limit: Option<i64>) -> Result<Vec<Run>> {
        self.inner.list_runs(thread_id, limit).await
    }

    async fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<bool> {
        self.inner.update_run_status(run_id, status).await
    }

    async fn complete_run(&self, run_id: &str, completion: &RunCompletion) -> Result<bool> {
        Self::stall(&self.slow_complete_run).await;
        Self::check(&self.fail_complete_run, "complete_run")?;
        self.inner.complete_run(run_id, completion).await
    }

    async fn health_check(&self) -> Result<()> {
        self.inner.health_check().await
    }
}
