mod run;
mod thread;

pub use run::MongoRunRepository;
pub use thread::MongoThreadRepository;
