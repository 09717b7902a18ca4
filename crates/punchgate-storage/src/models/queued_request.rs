use chrono::{DateTime, Utc};
use punchgate_core::AttendanceRecord;
use serde::{Deserialize, Serialize};

/// A delivery that failed every immediate attempt, persisted for replay.
///
/// Maps to the `failed_requests` table. `retry_count` starts at 0 and only
/// ever grows; once it reaches the configured maximum the row is skipped by
/// reconciliation but kept for operator inspection.
///
/// # Examples
///
/// ```
/// use punchgate_storage::models::QueuedDeliveryRequest;
/// use chrono::Utc;
///
/// let queued = QueuedDeliveryRequest {
///     id: 1,
///     punch_code: "17".to_string(),
///     employee_name: "Asha".to_string(),
///     timestamp_str: "2024-03-01 09:00:00".to_string(),
///     device_id: "ZX01".to_string(),
///     created_at: Utc::now(),
///     retry_count: 3,
///     last_error: Some("Request timeout".to_string()),
/// };
///
/// assert!(queued.is_exhausted(3));
/// assert_eq!(queued.to_record().device_id, "ZX01");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueuedDeliveryRequest {
    /// Auto-increment primary key
    pub id: i64,
    pub punch_code: String,
    pub employee_name: String,
    /// Punch timestamp exactly as the device sent it
    pub timestamp_str: String,
    pub device_id: String,
    /// When the request was queued
    pub created_at: DateTime<Utc>,
    /// Reconciliation attempts made so far
    pub retry_count: i64,
    /// Diagnostic from the most recent failed attempt
    pub last_error: Option<String>,
}

impl QueuedDeliveryRequest {
    /// Rebuild the attendance record this request was created from.
    pub fn to_record(&self) -> AttendanceRecord {
        AttendanceRecord::new(
            self.punch_code.as_str(),
            self.employee_name.as_str(),
            self.timestamp_str.as_str(),
            self.device_id.as_str(),
        )
    }

    /// Whether reconciliation has given up on this request.
    pub fn is_exhausted(&self, max_retry_count: u32) -> bool {
        self.retry_count >= i64::from(max_retry_count)
    }
}

/// Queue depth split by reconciliation eligibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Rows still eligible for replay
    pub pending: i64,
    /// Rows at or above the maximum retry count
    pub exhausted: i64,
}

impl QueueCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.exhausted
    }
}
