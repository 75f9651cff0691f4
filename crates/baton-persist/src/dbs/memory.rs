//! In-memory [`RunStore`] for single-process deployments and tests.
//!
//! Rows live in an arena keyed by id. Each row carries a version number
//! that is bumped on every write. Conditional updates read a snapshot,
//! evaluate the predicate against it, and commit with a compare-and-swap
//! on the version; a lost race re-evaluates the predicate against the
//! fresh row, so two writers can never both act on the same prior state.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use baton_types::{NewRun, NewThread, Run, RunCompletion, RunOutcome, RunStatus, Thread};
use crate::error::{PersistError, Result};
use crate::trait_client::RunStore;

#[derive(Debug, Clone)]
struct Versioned<T> {
    version: u64,
    value: T,
}

/// Result of a conditional update against one row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Update {
    Applied,
    Unmatched,
    Missing,
}

impl Update {
    fn applied(self) -> bool {
        self == Update::Applied
    }
}

struct Table<T> {
    rows: RwLock<HashMap<String, Versioned<T>>>,
}

impl<T: Clone> Table<T> {
    fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    async fn get(&self, id: &str) -> Option<T> {
        self.rows.read().await.get(id).map(|row| row.value.clone())
    }

    async fn insert(&self, id: String, value: T) {
        self.rows
            .write()
            .await
            .insert(id, Versioned { version: 0, value });
    }

    async fn snapshot(&self, id: &str) -> Option<Versioned<T>> {
        self.rows.read().await.get(id).cloned()
    }

    /// Swap in `value` only if the row is still at `expected_version`
    async fn compare_and_swap(&self, id: &str, expected_version: u64, value: T) -> bool {
        let mut rows = self.rows.write().await;
        match rows.get_mut(id) {
            Some(row) if row.version == expected_version => {
                row.version += 1;
                row.value = value;
                true
            }
            _ => false,
        }
    }

    /// Apply `apply` to the row if `predicate` holds, as one atomic step
    async fn update_where<P, F>(&self, id: &str, predicate: P, apply: F) -> Update
    where
        P: Fn(&T) -> bool,
        F: Fn(&mut T),
    {
        loop {
            let Some(snapshot) = self.snapshot(id).await else {
                return Update::Missing;
            };
            if !predicate(&snapshot.value) {
                return Update::Unmatched;
            }

            let mut next = snapshot.value;
            apply(&mut next);

            if self.compare_and_swap(id, snapshot.version, next).await {
                return Update::Applied;
            }
            tracing::trace!(id, "version moved under conditional update, re-evaluating");
        }
    }

    async fn values(&self) -> Vec<T> {
        self.rows
            .read()
            .await
            .values()
            .map(|row| row.value.clone())
            .collect()
    }
}

/// Versioned in-memory arena implementing [`RunStore`]
pub struct MemoryStore {
    threads: Table<Thread>,
    runs: Table<Run>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            threads: Table::new(),
            runs: Table::new(),
        }
    }

    /// Number of writes applied to a thread row since it was created
    pub async fn thread_version(&self, thread_id: &str) -> Option<u64> {
        self.threads.snapshot(thread_id).await.map(|row| row.version)
    }
}

fn paginate<T>(items: Vec<T>, limit: Option<i64>, skip: Option<i64>) -> Vec<T> {
    let skip = skip.unwrap_or(0).max(0) as usize;
    let iter = items.into_iter().skip(skip);
    match limit {
        Some(limit) => iter.take(limit.max(0) as usize).collect(),
        None => iter.collect(),
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn create_thread(&self, input: NewThread) -> Result<Thread> {
        let thread = Thread::from_new(input, Utc::now());
        self.threads.insert(thread.id.clone(), thread.clone()).await;
        Ok(thread)
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>> {
        Ok(self.threads.get(thread_id).await)
    }

    async fn list_threads(
        &self,
        user_id: &str,
        limit: Option<i64>,
        skip: Option<i64>,
    ) -> Result<Vec<Thread>> {
        let mut threads: Vec<Thread> = self
            .threads
            .values()
            .await
            .into_iter()
            .filter(|t| t.user_id == user_id)
            .collect();
        threads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(paginate(threads, limit, skip))
    }

    async fn record_message(&self, thread_id: &str) -> Result<()> {
        let update = self
            .threads
            .update_where(
                thread_id,
                |_| true,
                |t| {
                    t.message_count += 1;
                    t.updated_at = Utc::now();
                },
            )
            .await;
        match update {
            Update::Missing => Err(PersistError::ThreadNotFound(thread_id.to_string())),
            _ => Ok(()),
        }
    }

    async fn acquire_run_lock(&self, thread_id: &str) -> Result<bool> {
        let update = self
            .threads
            .update_where(
                thread_id,
                |t| t.run_status == RunStatus::Idle,
                |t| t.apply_acquire(Utc::now()),
            )
            .await;
        Ok(update.applied())
    }

    async fn set_current_run_id(&self, thread_id: &str, run_id: &str) -> Result<bool> {
        let update = self
            .threads
            .update_where(
                thread_id,
                |t| t.run_status != RunStatus::Idle && t.current_run_id.is_none(),
                |t| {
                    t.current_run_id = Some(run_id.to_string());
                    t.updated_at = Utc::now();
                },
            )
            .await;
        Ok(update.applied())
    }

    async fn release_unlinked_run_lock(&self, thread_id: &str) -> Result<bool> {
        let update = self
            .threads
            .update_where(
                thread_id,
                |t| t.run_status != RunStatus::Idle && t.current_run_id.is_none(),
                |t| {
                    t.run_status = RunStatus::Idle;
                    t.updated_at = Utc::now();
                },
            )
            .await;
        Ok(update.applied())
    }

    async fn set_thread_run_status(
        &self,
        thread_id: &str,
        run_id: &str,
        status: RunStatus,
    ) -> Result<bool> {
        let update = self
            .threads
            .update_where(
                thread_id,
                |t| t.current_run_id.as_deref() == Some(run_id),
                |t| {
                    t.run_status = status;
                    t.updated_at = Utc::now();
                },
            )
            .await;
        Ok(update.applied())
    }

    async fn release_run_lock(
        &self,
        thread_id: &str,
        run_id: &str,
        outcome: &RunOutcome,
    ) -> Result<()> {
        let update = self
            .threads
            .update_where(
                thread_id,
                |_| true,
                |t| t.apply_release(run_id, outcome, Utc::now()),
            )
            .await;
        match update {
            Update::Missing => Err(PersistError::ThreadNotFound(thread_id.to_string())),
            _ => Ok(()),
        }
    }

    async fn release_run_lock_if_current(
        &self,
        thread_id: &str,
        run_id: &str,
        outcome: &RunOutcome,
    ) -> Result<bool> {
        let update = self
            .threads
            .update_where(
                thread_id,
                |t| t.current_run_id.as_deref() == Some(run_id),
                |t| t.apply_release(run_id, outcome, Utc::now()),
            )
            .await;
        Ok(update.applied())
    }

    async fn create_run(&self, input: NewRun) -> Result<Run> {
        let run = Run::from_new(input, Utc::now());
        self.runs.insert(run.id.clone(), run.clone()).await;
        Ok(run)
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<Run>> {
        Ok(self.runs.get(run_id).await)
    }

    async fn list_runs(&self, thread_id: &str, limit: Option<i64>) -> Result<Vec<Run>> {
        let mut runs: Vec<Run> = self
            .runs
            .values()
            .await
            .into_iter()
            .filter(|r| r.thread_id == thread_id)
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(runs, limit, None))
    }

    async fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<bool> {
        let update = self
            .runs
            .update_where(
                run_id,
                |r| !r.is_terminal(),
                |r| r.apply_status(status, Utc::now()),
            )
            .await;
        match update {
            Update::Missing => Err(PersistError::RunNotFound(run_id.to_string())),
            other => Ok(other.applied()),
        }
    }

    async fn complete_run(&self, run_id: &str, completion: &RunCompletion) -> Result<bool> {
        let update = self
            .runs
            .update_where(
                run_id,
                |r| !r.is_terminal(),
                |r| r.apply_completion(completion, Utc::now()),
            )
            .await;
        match update {
            Update::Missing => Err(PersistError::RunNotFound(run_id.to_string())),
            other => Ok(other.applied()),
        }
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
