use mongodb::{Client, Database, bson::doc};
use async_trait::async_trait;
use chrono::Utc;

use baton_types::{NewRun, NewThread, Run, RunCompletion, RunOutcome, RunStatus, Thread};
use crate::trait_client::RunStore;
use crate::dbs::mongo::models::{MongoRun, MongoThread};
use crate::dbs::mongo::repositories::{MongoRunRepository, MongoThreadRepository};
use crate::error::{Result, PersistError};

pub struct MongoRunStore {
    database: Database,
    thread_repo: MongoThreadRepository,
    run_repo: MongoRunRepository,
}

impl MongoRunStore {
    /// Connect to MongoDB and create client
    pub async fn connect(mongodb_uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(mongodb_uri)
            .await
            .map_err(|e| PersistError::Connection(e.to_string()))?;

        Ok(Self {
            database: client.database(database),
            thread_repo: MongoThreadRepository::new(&client, database),
            run_repo: MongoRunRepository::new(&client, database),
        })
    }
}

#[async_trait]
impl RunStore for MongoRunStore {
    async fn create_thread(&self, input: NewThread) -> Result<Thread> {
        let thread = Thread::from_new(input, Utc::now());
        self.thread_repo
            .insert_thread(&MongoThread::from(thread.clone()))
            .await?;
        Ok(thread)
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>> {
        let mongo_thread = self.thread_repo.get_thread(thread_id).await?;
        Ok(mongo_thread.map(|t| t.into()))
    }

    async fn list_threads(
        &self,
        user_id: &str,
        limit: Option<i64>,
        skip: Option<i64>,
    ) -> Result<Vec<Thread>> {
        let mongo_threads = self.thread_repo.list_threads(user_id, limit, skip).await?;
        let threads = mongo_threads.into_iter().map(|t| t.into()).collect();
        Ok(threads)
    }

    async fn record_message(&self, thread_id: &str) -> Result<()> {
        if !self.thread_repo.increment_messages(thread_id).await? {
            return Err(PersistError::ThreadNotFound(thread_id.to_string()));
        }
        Ok(())
    }

    async fn acquire_run_lock(&self, thread_id: &str) -> Result<bool> {
        self.thread_repo.acquire_lock(thread_id).await
    }

    async fn set_current_run_id(&self, thread_id: &str, run_id: &str) -> Result<bool> {
        self.thread_repo.link_run(thread_id, run_id).await
    }

    async fn release_unlinked_run_lock(&self, thread_id: &str) -> Result<bool> {
        self.thread_repo.release_unlinked(thread_id).await
    }

    async fn set_thread_run_status(
        &self,
        thread_id: &str,
        run_id: &str,
        status: RunStatus,
    ) -> Result<bool> {
        self.thread_repo.set_run_status(thread_id, run_id, status).await
    }

    async fn release_run_lock(
        &self,
        thread_id: &str,
        run_id: &str,
        outcome: &RunOutcome,
    ) -> Result<()> {
        if !self.thread_repo.release_lock(thread_id, run_id, outcome, false).await? {
            return Err(PersistError::ThreadNotFound(thread_id.to_string()));
        }
        Ok(())
    }

    async fn release_run_lock_if_current(
        &self,
        thread_id: &str,
        run_id: &str,
        outcome: &RunOutcome,
    ) -> Result<bool> {
        self.thread_repo.release_lock(thread_id, run_id, outcome, true).await
    }

    async fn create_run(&self, input: NewRun) -> Result<Run> {
        let run = Run::from_new(input, Utc::now());
        self.run_repo.insert_run(&MongoRun::from(run.clone())).await?;
        Ok(run)
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<Run>> {
        let mongo_run = self.run_repo.get_run(run_id).await?;
        Ok(mongo_run.map(|r| r.into()))
    }

    async fn list_runs(&self, thread_id: &str, limit: Option<i64>) -> Result<Vec<Run>> {
        let mongo_runs = self.run_repo.list_runs(thread_id, limit).await?;
        Ok(mongo_runs.into_iter().map(|r| r.into()).collect())
    }

    async fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<bool> {
        if self.run_repo.set_status(run_id, status).await? {
            return Ok(true);
        }
        if !self.run_repo.exists(run_id).await? {
            return Err(PersistError::RunNotFound(run_id.to_string()));
        }
        Ok(false)
    }

    async fn complete_run(&self, run_id: &str, completion: &RunCompletion) -> Result<bool> {
        if self.run_repo.complete(run_id, completion).await? {
            return Ok(true);
        }
        if !self.run_repo.exists(run_id).await? {
            return Err(PersistError::RunNotFound(run_id.to_string()));
        }
        Ok(false)
    }

    async fn health_check(&self) -> Result<()> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}
