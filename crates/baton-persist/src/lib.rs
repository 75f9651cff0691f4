pub mod error;
pub mod trait_client;
pub mod dbs;
pub mod builder;

pub use error::PersistError;
pub use trait_client::RunStore;
pub use dbs::memory::MemoryStore;
pub use builder::{StoreBackend, StoreBuilder};

#[cfg(feature = "mongodb")]
pub use dbs::mongo::MongoRunStore;
