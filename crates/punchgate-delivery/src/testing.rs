//! In-memory doubles for the store and upstream, used by unit tests.

use crate::client::{CheckinPayload, TransportError, UpstreamClient};
use chrono::Utc;
use punchgate_core::AttendanceRecord;
use punchgate_storage::{FailureStore, QueuedDeliveryRequest, StorageError, StorageResult};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::time::Instant;

/// Upstream that fails its first `failures` calls, then succeeds.
pub struct ScriptedUpstream {
    failures: usize,
    calls: Mutex<Vec<(Instant, CheckinPayload)>>,
}

impl ScriptedUpstream {
    pub fn always_ok() -> Self {
        Self::failing(0)
    }

    pub fn always_failing() -> Self {
        Self::failing(usize::MAX)
    }

    pub fn failing(failures: usize) -> Self {
        Self {
            failures,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn payloads(&self) -> Vec<CheckinPayload> {
        self.calls.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
    }
}

impl UpstreamClient for ScriptedUpstream {
    async fn send(&self, payload: &CheckinPayload) -> Result<(), TransportError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push((Instant::now(), payload.clone()));
        if calls.len() <= self.failures {
            Err(TransportError::status(503, "upstream unavailable"))
        } else {
            Ok(())
        }
    }
}

/// Failure store kept in a vector.
#[derive(Default)]
pub struct MemoryFailureStore {
    rows: Mutex<Vec<QueuedDeliveryRequest>>,
    next_id: AtomicUsize,
    enqueue_calls: AtomicUsize,
    list_calls: Mutex<Vec<Instant>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    fail_updates: AtomicBool,
}

impl MemoryFailureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `enqueue` fail.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Make every `list_pending` fail.
    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    /// Make every `increment_retry` and `remove` fail.
    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }

    /// When `list_pending` was called, on the tokio clock.
    pub fn list_times(&self) -> Vec<Instant> {
        self.list_calls.lock().unwrap().clone()
    }

    pub fn enqueue_calls(&self) -> usize {
        self.enqueue_calls.load(Ordering::SeqCst)
    }

    pub fn rows(&self) -> Vec<QueuedDeliveryRequest> {
        self.rows.lock().unwrap().clone()
    }

    /// Insert a row directly, bypassing the call counter.
    pub fn seed(&self, record: &AttendanceRecord, retry_count: i64) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1;
        self.rows.lock().unwrap().push(QueuedDeliveryRequest {
            id,
            punch_code: record.punch_code.clone(),
            employee_name: record.employee_name.clone(),
            timestamp_str: record.timestamp.clone(),
            device_id: record.device_id.clone(),
            created_at: Utc::now(),
            retry_count,
            last_error: None,
        });
        id
    }
}

impl FailureStore for MemoryFailureStore {
    async fn enqueue(&self, record: &AttendanceRecord, error: &str) -> StorageResult<i64> {
        self.enqueue_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Configuration("disk full".to_string()));
        }
        let id = self.seed(record, 0);
        if let Some(row) = self.rows.lock().unwrap().iter_mut().find(|r| r.id == id) {
            row.last_error = Some(error.to_string());
        }
        Ok(id)
    }

    async fn list_pending(
        &self,
        limit: u32,
        max_retry_count: u32,
    ) -> StorageResult<Vec<QueuedDeliveryRequest>> {
        self.list_calls.lock().unwrap().push(Instant::now());
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Configuration("database locked".to_string()));
        }
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !r.is_exhausted(max_retry_count))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn increment_retry(&self, id: i64, error: &str) -> StorageResult<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StorageError::Configuration("database locked".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StorageError::NotFound {
                entity_type: "QueuedDeliveryRequest".to_string(),
                field: "id".to_string(),
                value: id.to_string(),
            })?;
        row.retry_count += 1;
        row.last_error = Some(error.to_string());
        Ok(())
    }

    async fn remove(&self, id: i64) -> StorageResult<bool> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StorageError::Configuration("database locked".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| r.id != id);
        Ok(rows.len() != before)
    }
}
