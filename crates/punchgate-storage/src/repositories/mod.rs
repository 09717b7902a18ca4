pub mod failure_queue;

pub use failure_queue::{FailureStore, SqliteFailureStore};
