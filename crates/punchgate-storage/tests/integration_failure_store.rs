//! Integration tests for the on-disk failure queue.
//!
//! Run with: cargo test --package punchgate-storage --test integration_failure_store

use punchgate_core::AttendanceRecord;
use punchgate_storage::{Database, DatabaseConfig, FailureStore, SqliteFailureStore};
use std::sync::Arc;
use tokio::sync::Barrier;

fn record(punch_code: &str) -> AttendanceRecord {
    AttendanceRecord::new(punch_code, "Asha", "2024-03-01 09:00:00", "ZX0006827500")
}

async fn open(path: &std::path::Path) -> Database {
    Database::open(DatabaseConfig::new(path.to_string_lossy()))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_queue_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("failed_requests.db");

    let (kept, retried) = {
        let db = open(&path).await;
        let store = SqliteFailureStore::new(db.pool().clone());
        let kept = store.enqueue(&record("17"), "Request timeout").await.unwrap();
        let retried = store.enqueue(&record("18"), "Connection error").await.unwrap();
        store.increment_retry(retried, "HTTP 502: bad gateway").await.unwrap();
        db.close().await;
        (kept, retried)
    };

    let db = open(&path).await;
    let store = SqliteFailureStore::new(db.pool().clone());

    let pending = store.list_pending(10, 3).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].id, kept);
    assert_eq!(pending[0].last_error.as_deref(), Some("Request timeout"));
    assert_eq!(pending[1].id, retried);
    assert_eq!(pending[1].retry_count, 1);

    db.close().await;
}

#[tokio::test]
async fn test_removed_request_never_reappears() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("failed_requests.db");

    {
        let db = open(&path).await;
        let store = SqliteFailureStore::new(db.pool().clone());
        let id = store.enqueue(&record("17"), "Request timeout").await.unwrap();
        assert!(store.remove(id).await.unwrap());
        db.close().await;
    }

    let db = open(&path).await;
    let store = SqliteFailureStore::new(db.pool().clone());
    assert!(store.list_pending(10, 3).await.unwrap().is_empty());
    assert_eq!(store.counts(3).await.unwrap().total(), 0);
    db.close().await;
}

#[tokio::test]
async fn test_concurrent_enqueue_and_reconcile() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir.path().join("failed_requests.db")).await;
    let store = Arc::new(SqliteFailureStore::new(db.pool().clone()));

    const NUM_WRITERS: usize = 8;
    let barrier = Arc::new(Barrier::new(NUM_WRITERS + 1));
    let mut handles = vec![];

    for i in 0..NUM_WRITERS {
        let store = store.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            store
                .enqueue(&record(&i.to_string()), "Connection error")
                .await
                .unwrap()
        }));
    }

    // Reconciler-side reads and updates run alongside the writers.
    let reader = {
        let store = store.clone();
        let barrier = barrier.clone();
        tokio::spawn(async move {
            barrier.wait().await;
            for queued in store.list_pending(NUM_WRITERS as u32, 3).await.unwrap() {
                store.increment_retry(queued.id, "HTTP 503: busy").await.unwrap();
            }
        })
    };

    let ids: Vec<i64> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    reader.await.unwrap();

    let mut unique = ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), NUM_WRITERS);

    let counts = store.counts(3).await.unwrap();
    assert_eq!(counts.total(), NUM_WRITERS as i64);
    assert_eq!(counts.exhausted, 0);

    db.close().await;
}
