use std::sync::Arc;

use crate::dbs::memory::MemoryStore;
use crate::error::{PersistError, Result};
use crate::trait_client::RunStore;

/// Which backend a [`StoreBuilder`] produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Mongo { uri: String, database: String },
}

pub struct StoreBuilder {
    backend: Option<StoreBackend>,
    mongodb_uri: Option<String>,
    database: Option<String>,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            mongodb_uri: None,
            database: None,
        }
    }

    /// Use the in-process memory store
    pub fn memory(mut self) -> Self {
        self.backend = Some(StoreBackend::Memory);
        self
    }

    pub fn backend(mut self, backend: StoreBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn mongodb_uri(mut self, uri: impl Into<String>) -> Self {
        self.mongodb_uri = Some(uri.into());
        self
    }

    pub fn database(mut self, db: impl Into<String>) -> Self {
        self.database = Some(db.into());
        self
    }

    fn resolve(self) -> Result<StoreBackend> {
        if let Some(backend) = self.backend {
            return Ok(backend);
        }
        match (self.mongodb_uri, self.database) {
            (Some(uri), Some(database)) => Ok(StoreBackend::Mongo { uri, database }),
            (Some(_), None) => Err(PersistError::Internal("database is required".to_string())),
            (None, _) => Ok(StoreBackend::Memory),
        }
    }

    pub async fn build(self) -> Result<Arc<dyn RunStore>> {
        match self.resolve()? {
            StoreBackend::Memory => {
                tracing::info!("Using in-memory run store");
                Ok(Arc::new(MemoryStore::new()))
            }
            StoreBackend::Mongo { uri, database } => connect_mongo(&uri, &database).await,
        }
    }
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "mongodb")]
async fn connect_mongo(uri: &str, database: &str) -> Result<Arc<dyn RunStore>> {
    tracing::info!(database, "Connecting to MongoDB run store");
    let store = crate::dbs::mongo::MongoRunStore::connect(uri, database).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "mongodb"))]
async fn connect_mongo(_uri: &str, _database: &str) -> Result<Arc<dyn RunStore>> {
    Err(PersistError::Internal(
        "MongoDB backend requested but baton-persist was built without the `mongodb` feature"
            .to_string(),
    ))
}
