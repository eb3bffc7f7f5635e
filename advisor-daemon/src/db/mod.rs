//! MongoDB persistence

pub mod mongo;
pub mod schemas;
pub mod store;

pub use mongo::{IntoIndexes, MongoClient, MongoCollection};
pub use store::MongoStore;
