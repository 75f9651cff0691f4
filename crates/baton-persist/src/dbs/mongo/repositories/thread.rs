use mongodb::{Client, Collection, bson::{doc, Bson, Document}};
use futures::TryStreamExt;
use chrono::Utc;

use baton_types::{RunOutcome, RunStatus};
use crate::dbs::mongo::models::MongoThread;
use crate::error::Result;

#[derive(Clone)]
pub struct MongoThreadRepository {
    collection: Collection<MongoThread>,
}

fn now() -> Result<Bson> {
    Ok(bson::to_bson(&Utc::now())?)
}

impl MongoThreadRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("threads");
        Self { collection }
    }

    /// Insert a new thread document
    pub async fn insert_thread(&self, thread: &MongoThread) -> Result<()> {
        self.collection.insert_one(thread).await?;
        Ok(())
    }

    /// Get thread by ID
    pub async fn get_thread(&self, thread_id: &str) -> Result<Option<MongoThread>> {
        let filter = doc! { "_id": thread_id };
        Ok(self.collection.find_one(filter).await?)
    }

    /// List threads for a user
    pub async fn list_threads(
        &self,
        user_id: &str,
        limit: Option<i64>,
        skip: Option<i64>,
    ) -> Result<Vec<MongoThread>> {
        let filter = doc! { "user_id": user_id };
        let mut find_opts = self.collection
            .find(filter)
            .sort(doc! { "updated_at": -1 });

        if let Some(limit) = limit {
            find_opts = find_opts.limit(limit);
        }
        if let Some(skip) = skip {
            find_opts = find_opts.skip(skip.try_into().unwrap_or(0));
        }

        let threads = find_opts
            .await?
            .try_collect()
            .await?;
        Ok(threads)
    }

    /// Bump the message counter
    pub async fn increment_messages(&self, thread_id: &str) -> Result<bool> {
        let filter = doc! { "_id": thread_id };
        let update = doc! {
            "$inc": { "message_count": 1_i64 },
            "$set": { "updated_at": now()? }
        };
        self.matched(filter, update).await
    }

    /// `IDLE -> WAITING`, clearing the previous run's status fields
    pub async fn acquire_lock(&self, thread_id: &str) -> Result<bool> {
        let filter = doc! {
            "_id": thread_id,
            "run_status": RunStatus::Idle.as_str(),
        };
        let update = doc! {
            "$set": {
                "run_status": RunStatus::Waiting.as_str(),
                "current_run_id": Bson::Null,
                "status_message": Bson::Null,
                "last_run_cancelled": Bson::Null,
                "last_run_error": Bson::Null,
                "updated_at": now()?
            }
        };
        self.matched(filter, update).await
    }

    pub async fn link_run(&self, thread_id: &str, run_id: &str) -> Result<bool> {
        let filter = doc! {
            "_id": thread_id,
            "run_status": { "$ne": RunStatus::Idle.as_str() },
            "current_run_id": Bson::Null,
        };
        let update = doc! {
            "$set": {
                "current_run_id": run_id,
                "updated_at": now()?
            }
        };
        self.matched(filter, update).await
    }

    pub async fn release_unlinked(&self, thread_id: &str) -> Result<bool> {
        let filter = doc! {
            "_id": thread_id,
            "run_status": { "$ne": RunStatus::Idle.as_str() },
            "current_run_id": Bson::Null,
        };
        let update = doc! {
            "$set": {
                "run_status": RunStatus::Idle.as_str(),
                "updated_at": now()?
            }
        };
        self.matched(filter, update).await
    }

    pub async fn set_run_status(
        &self,
        thread_id: &str,
        run_id: &str,
        status: RunStatus,
    ) -> Result<bool> {
        let filter = doc! { "_id": thread_id, "current_run_id": run_id };
        let update = doc! {
            "$set": {
                "run_status": status.as_str(),
                "updated_at": now()?
            }
        };
        self.matched(filter, update).await
    }

    /// Release the lock. With `only_if_current` the write is conditioned
    /// on `current_run_id == run_id`.
    pub async fn release_lock(
        &self,
        thread_id: &str,
        run_id: &str,
        outcome: &RunOutcome,
        only_if_current: bool,
    ) -> Result<bool> {
        let mut filter = doc! { "_id": thread_id };
        if only_if_current {
            filter.insert("current_run_id", run_id);
        }
        let update = doc! {
            "$set": {
                "run_status": RunStatus::Idle.as_str(),
                "current_run_id": Bson::Null,
                "last_run_cancelled": outcome.was_cancelled,
                "last_run_error": bson::to_bson(&outcome.error)?,
                "pending_tool_call_ids": bson::to_bson(&outcome.pending_tool_call_ids)?,
                "last_completed_run_id": run_id,
                "updated_at": now()?
            }
        };
        self.matched(filter, update).await
    }

    async fn matched(&self, filter: Document, update: Document) -> Result<bool> {
        let result = self.collection.update_one(filter, update).await?;
        Ok(result.matched_count > 0)
    }
}
