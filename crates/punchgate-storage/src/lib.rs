//! Durable failure queue for the punchgate gateway.
//!
//! Attendance records that could not be delivered upstream after every
//! immediate attempt are written here and replayed later by the reconciler.
//! The queue is a single SQLite table managed through `sqlx`, so it survives
//! process restarts.
//!
//! # Architecture
//!
//! - [`Database`] - connection pool with embedded migrations
//! - [`FailureStore`] - the queue contract used by delivery code
//! - [`SqliteFailureStore`] - SQLite implementation, plus inspection queries
//!
//! # Example
//!
//! ```no_run
//! use punchgate_core::AttendanceRecord;
//! use punchgate_storage::{Database, DatabaseConfig, FailureStore, SqliteFailureStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::open(DatabaseConfig::default()).await?;
//! let store = SqliteFailureStore::new(db.pool().clone());
//!
//! let record = AttendanceRecord::new("17", "Asha", "2024-03-01 09:00:00", "ZX01");
//! let id = store.enqueue(&record, "Request timeout").await?;
//!
//! for queued in store.list_pending(5, 3).await? {
//!     println!("{} -> retry {}", queued.id, queued.retry_count);
//! }
//! store.remove(id).await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;

pub use connection::{DEFAULT_DATABASE_PATH, Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use models::{QueueCounts, QueuedDeliveryRequest};
pub use repositories::{FailureStore, SqliteFailureStore};
