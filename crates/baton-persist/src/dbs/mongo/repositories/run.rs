use mongodb::{Client, Collection, bson::{doc, Bson}};
use futures::TryStreamExt;
use chrono::Utc;

use baton_types::{RunCompletion, RunStatus};
use crate::dbs::mongo::models::MongoRun;
use crate::error::Result;

#[derive(Clone)]
pub struct MongoRunRepository {
    collection: Collection<MongoRun>,
}

impl MongoRunRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("runs");
        Self { collection }
    }

    pub async fn insert_run(&self, run: &MongoRun) -> Result<()> {
        self.collection.insert_one(run).await?;
        Ok(())
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<MongoRun>> {
        let filter = doc! { "_id": run_id };
        Ok(self.collection.find_one(filter).await?)
    }

    /// List runs for a thread, newest first
    pub async fn list_runs(&self, thread_id: &str, limit: Option<i64>) -> Result<Vec<MongoRun>> {
        let filter = doc! { "thread_id": thread_id };
        let mut find_opts = self.collection
            .find(filter)
            .sort(doc! { "created_at": -1 });

        if let Some(limit) = limit {
            find_opts = find_opts.limit(limit);
        }

        let runs = find_opts
            .await?
            .try_collect()
            .await?;
        Ok(runs)
    }

    /// Set status on a run that has not completed.
    ///
    /// Uses a pipeline update so `started_at` is stamped in the same write,
    /// and only the first time the run enters `STREAMING`.
    pub async fn set_status(&self, run_id: &str, status: RunStatus) -> Result<bool> {
        let now = bson::to_bson(&Utc::now())?;
        let filter = doc! { "_id": run_id, "completed_at": Bson::Null };
        let started_at = if status == RunStatus::Streaming {
            Bson::Document(doc! { "$ifNull": ["$started_at", now.clone()] })
        } else {
            Bson::String("$started_at".to_string())
        };
        let pipeline = vec![doc! {
            "$set": {
                "status": status.as_str(),
                "started_at": started_at,
                "updated_at": now,
            }
        }];

        let result = self.collection.update_one(filter, pipeline).await?;
        Ok(result.matched_count > 0)
    }

    /// Write terminal fields; only the first terminal write matches
    pub async fn complete(&self, run_id: &str, completion: &RunCompletion) -> Result<bool> {
        let now = bson::to_bson(&Utc::now())?;
        let filter = doc! { "_id": run_id, "completed_at": Bson::Null };
        let update = doc! {
            "$set": {
                "status": RunStatus::Idle.as_str(),
                "is_cancelled": completion.is_cancelled,
                "error_code": bson::to_bson(&completion.error_code)?,
                "error_message": bson::to_bson(&completion.error_message)?,
                "completed_at": now.clone(),
                "updated_at": now,
            }
        };
        let result = self.collection.update_one(filter, update).await?;
        Ok(result.matched_count > 0)
    }

    pub async fn exists(&self, run_id: &str) -> Result<bool> {
        Ok(self.get_run(run_id).await?.is_some())
    }
}
