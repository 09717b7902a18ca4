use crate::error::{StorageError, StorageResult};
use crate::models::{QueueCounts, QueuedDeliveryRequest};
use chrono::Utc;
use punchgate_core::AttendanceRecord;
use sqlx::SqlitePool;
use std::future::Future;

/// Durable queue of failed deliveries.
///
/// `enqueue` is called from the live delivery path; the other operations
/// belong to the reconciler. Implementations must tolerate both running at
/// the same time.
///
/// Methods return `Send` futures so that generic callers can be spawned onto
/// the runtime. Implementations can still be written with `async fn`.
pub trait FailureStore: Send + Sync {
    /// Persist a record with the error that exhausted its attempts. Returns the new id.
    fn enqueue(
        &self,
        record: &AttendanceRecord,
        error: &str,
    ) -> impl Future<Output = StorageResult<i64>> + Send;

    /// Oldest-first requests whose retry count is below `max_retry_count`.
    fn list_pending(
        &self,
        limit: u32,
        max_retry_count: u32,
    ) -> impl Future<Output = StorageResult<Vec<QueuedDeliveryRequest>>> + Send;

    /// Record one more failed replay.
    ///
    /// # Errors
    /// Returns `StorageError::NotFound` if no request has this id.
    fn increment_retry(&self, id: i64, error: &str)
    -> impl Future<Output = StorageResult<()>> + Send;

    /// Delete a delivered request. Returns `false` if it was already gone.
    fn remove(&self, id: i64) -> impl Future<Output = StorageResult<bool>> + Send;
}

/// SQLite implementation of [`FailureStore`].
#[derive(Debug, Clone)]
pub struct SqliteFailureStore {
    pool: SqlitePool,
}

impl SqliteFailureStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetch a single request by id.
    pub async fn get(&self, id: i64) -> StorageResult<Option<QueuedDeliveryRequest>> {
        let queued = sqlx::query_as::<_, QueuedDeliveryRequest>(
            r#"
            SELECT id, punch_code, employee_name, timestamp_str, device_id,
                   created_at, retry_count, last_error
            FROM failed_requests
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(queued)
    }

    /// Requests reconciliation has given up on, oldest first.
    pub async fn list_exhausted(
        &self,
        limit: u32,
        max_retry_count: u32,
    ) -> StorageResult<Vec<QueuedDeliveryRequest>> {
        let queued = sqlx::query_as::<_, QueuedDeliveryRequest>(
            r#"
            SELECT id, punch_code, employee_name, timestamp_str, device_id,
                   created_at, retry_count, last_error
            FROM failed_requests
            WHERE retry_count >= ?
            ORDER BY created_at ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(i64::from(max_retry_count))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(queued)
    }

    /// Queue depth split at `max_retry_count`.
    pub async fn counts(&self, max_retry_count: u32) -> StorageResult<QueueCounts> {
        let max = i64::from(max_retry_count);
        let (pending, exhausted): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN retry_count < ? THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN retry_count >= ? THEN 1 ELSE 0 END), 0)
            FROM failed_requests
            "#,
        )
        .bind(max)
        .bind(max)
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueCounts { pending, exhausted })
    }
}

impl FailureStore for SqliteFailureStore {
    async fn enqueue(&self, record: &AttendanceRecord, error: &str) -> StorageResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO failed_requests (
                punch_code, employee_name, timestamp_str, device_id,
                created_at, retry_count, last_error
            )
            VALUES (?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&record.punch_code)
        .bind(&record.employee_name)
        .bind(&record.timestamp)
        .bind(&record.device_id)
        .bind(Utc::now())
        .bind(error)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        tracing::info!(
            queue_id = id,
            punch_code = %record.punch_code,
            device_id = %record.device_id,
            error = %error,
            "Delivery queued for retry"
        );
        Ok(id)
    }

    async fn list_pending(
        &self,
        limit: u32,
        max_retry_count: u32,
    ) -> StorageResult<Vec<QueuedDeliveryRequest>> {
        let queued = sqlx::query_as::<_, QueuedDeliveryRequest>(
            r#"
            SELECT id, punch_code, employee_name, timestamp_str, device_id,
                   created_at, retry_count, last_error
            FROM failed_requests
            WHERE retry_count < ?
            ORDER BY created_at ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(i64::from(max_retry_count))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(queued)
    }

    async fn increment_retry(&self, id: i64, error: &str) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE failed_requests
            SET retry_count = retry_count + 1, last_error = ?
            WHERE id = ?
            "#,
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::queued_request_not_found(id));
        }
        Ok(())
    }

    async fn remove(&self, id: i64) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM failed_requests WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;
    use rstest::rstest;

    async fn setup_test_db() -> (Database, SqliteFailureStore) {
        let db = Database::in_memory().await.unwrap();
        let store = SqliteFailureStore::new(db.pool().clone());
        (db, store)
    }

    fn record(punch_code: &str) -> AttendanceRecord {
        AttendanceRecord::new(punch_code, "Asha", "2024-03-01 09:00:00", "ZX01")
    }

    #[tokio::test]
    async fn test_enqueue_and_get() {
        let (_db, store) = setup_test_db().await;

        let id = store.enqueue(&record("17"), "HTTP 500: boom").await.unwrap();
        let queued = store.get(id).await.unwrap().unwrap();

        assert_eq!(queued.punch_code, "17");
        assert_eq!(queued.employee_name, "Asha");
        assert_eq!(queued.timestamp_str, "2024-03-01 09:00:00");
        assert_eq!(queued.device_id, "ZX01");
        assert_eq!(queued.retry_count, 0);
        assert_eq!(queued.last_error.as_deref(), Some("HTTP 500: boom"));
        assert_eq!(queued.to_record(), record("17"));
    }

    #[tokio::test]
    async fn test_list_pending_oldest_first_with_limit() {
        let (_db, store) = setup_test_db().await;

        let first = store.enqueue(&record("1"), "e").await.unwrap();
        let second = store.enqueue(&record("2"), "e").await.unwrap();
        store.enqueue(&record("3"), "e").await.unwrap();

        let pending = store.list_pending(2, 3).await.unwrap();
        let ids: Vec<i64> = pending.iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[tokio::test]
    async fn test_increment_retry_excludes_exhausted() {
        let (_db, store) = setup_test_db().await;
        let id = store.enqueue(&record("17"), "first").await.unwrap();

        for attempt in 1..=3 {
            store.increment_retry(id, &format!("failure {attempt}")).await.unwrap();
        }

        assert!(store.list_pending(10, 3).await.unwrap().is_empty());

        let exhausted = store.list_exhausted(10, 3).await.unwrap();
        assert_eq!(exhausted.len(), 1);
        assert_eq!(exhausted[0].retry_count, 3);
        assert_eq!(exhausted[0].last_error.as_deref(), Some("failure 3"));
    }

    #[tokio::test]
    async fn test_increment_retry_unknown_id() {
        let (_db, store) = setup_test_db().await;

        let result = store.increment_retry(404, "nope").await;
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (_db, store) = setup_test_db().await;
        let id = store.enqueue(&record("17"), "e").await.unwrap();

        assert!(store.remove(id).await.unwrap());
        assert!(!store.remove(id).await.unwrap());
        assert!(store.get(id).await.unwrap().is_none());
        assert!(store.list_pending(10, 3).await.unwrap().is_empty());
    }

    #[rstest]
    #[case(0, 0, 2)]
    #[case(1, 1, 1)]
    #[case(3, 2, 0)]
    #[tokio::test]
    async fn test_counts(
        #[case] max_retry_count: u32,
        #[case] expected_pending: i64,
        #[case] expected_exhausted: i64,
    ) {
        let (_db, store) = setup_test_db().await;
        store.enqueue(&record("1"), "e").await.unwrap();
        let retried = store.enqueue(&record("2"), "e").await.unwrap();
        store.increment_retry(retried, "e").await.unwrap();

        let counts = store.counts(max_retry_count).await.unwrap();
        assert_eq!(counts.pending, expected_pending);
        assert_eq!(counts.exhausted, expected_exhausted);
        assert_eq!(counts.total(), 2);
    }

    #[tokio::test]
    async fn test_counts_empty_queue() {
        let (_db, store) = setup_test_db().await;
        assert_eq!(store.counts(3).await.unwrap(), QueueCounts::default());
    }
}
