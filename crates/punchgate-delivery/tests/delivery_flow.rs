//! End-to-end delivery against a mock HR endpoint and a real SQLite queue.
//!
//! Run with: cargo test --package punchgate-delivery --test delivery_flow

use mockito::Server;
use punchgate_core::AttendanceRecord;
use punchgate_delivery::{
    DeliveryOutcome, HttpUpstreamClient, PassSummary, Reconciler, ReconcilerConfig,
    RetryController, RetryPolicy, UpstreamConfig,
};
use punchgate_storage::{Database, FailureStore, SqliteFailureStore};
use std::sync::Arc;
use std::time::Duration;

const CHECKIN_PATH: &str = "/api/method/add_checkin";

/// Backoff of 2ms then 4ms keeps the test fast while exercising the schedule.
fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        time_unit: Duration::from_millis(1),
        ..RetryPolicy::default()
    }
}

async fn setup(
    server_url: String,
) -> (
    Database,
    Arc<RetryController<SqliteFailureStore, HttpUpstreamClient>>,
) {
    let db = Database::in_memory().await.unwrap();
    let store = SqliteFailureStore::new(db.pool().clone());
    let upstream = HttpUpstreamClient::new(
        UpstreamConfig::new(server_url)
            .api_path(CHECKIN_PATH)
            .request_timeout(Duration::from_secs(2)),
    )
    .unwrap();
    let controller = Arc::new(RetryController::new(store, upstream, fast_policy()));
    (db, controller)
}

fn record() -> AttendanceRecord {
    AttendanceRecord::new("17", "Asha", "2024-03-01 09:00:00", "ZX0006827500")
}

#[tokio::test]
async fn test_outage_then_recovery() {
    let mut server = Server::new_async().await;
    let (_db, controller) = setup(server.url()).await;

    // Outage: every attempt fails, record lands in the queue.
    let outage = server
        .mock("POST", CHECKIN_PATH)
        .with_status(500)
        .with_body("Internal Server Error")
        .expect(3)
        .create_async()
        .await;

    let outcome = controller.deliver(&record()).await;
    assert_eq!(outcome, DeliveryOutcome::Queued);
    outage.assert_async().await;

    let pending = controller.store().list_pending(5, 3).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].timestamp_str, "2024-03-01 09:00:00");
    assert_eq!(
        pending[0].last_error.as_deref(),
        Some("HTTP 500: Internal Server Error")
    );
    outage.remove_async().await;

    // Recovery: the reconciler delivers and removes it.
    let recovered = server
        .mock("POST", CHECKIN_PATH)
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let reconciler = Reconciler::new(controller.clone(), ReconcilerConfig::default());
    let summary = reconciler.run_pass().await.unwrap();
    assert_eq!(
        summary,
        PassSummary {
            fetched: 1,
            delivered: 1,
            failed: 0
        }
    );
    recovered.assert_async().await;

    assert!(controller.store().list_pending(5, 3).await.unwrap().is_empty());
    assert_eq!(controller.store().counts(3).await.unwrap().total(), 0);

    // A second pass has nothing to do.
    assert_eq!(reconciler.run_pass().await.unwrap().fetched, 0);
}

#[tokio::test]
async fn test_persistent_outage_exhausts_request() {
    let mut server = Server::new_async().await;
    let (_db, controller) = setup(server.url()).await;

    let _outage = server
        .mock("POST", CHECKIN_PATH)
        .with_status(503)
        .expect_at_least(1)
        .create_async()
        .await;

    assert_eq!(controller.deliver(&record()).await, DeliveryOutcome::Queued);

    let reconciler = Reconciler::new(controller.clone(), ReconcilerConfig::default());
    for _ in 0..3 {
        assert_eq!(reconciler.run_pass().await.unwrap().failed, 1);
    }
    assert_eq!(reconciler.run_pass().await.unwrap().fetched, 0);

    let exhausted = controller.store().list_exhausted(10, 3).await.unwrap();
    assert_eq!(exhausted.len(), 1);
    assert_eq!(exhausted[0].retry_count, 3);
}

#[tokio::test]
async fn test_bad_timestamp_is_never_queued() {
    let server = Server::new_async().await;
    let (_db, controller) = setup(server.url()).await;

    let bad = AttendanceRecord::new("17", "Asha", "yesterday at nine", "ZX0006827500");
    assert_eq!(controller.deliver(&bad).await, DeliveryOutcome::Rejected);
    assert_eq!(controller.store().counts(3).await.unwrap().total(), 0);
}
