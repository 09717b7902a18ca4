//! Bounded retries with exponential backoff.
//!
//! A live record gets up to `max_attempts` upstream calls. Between attempt
//! `n` and `n + 1` the controller sleeps `time_unit * backoff_base^n`, so the
//! defaults wait 2s then 4s. When every attempt fails the record is written
//! to the failure queue and the device is told it was not processed.
//!
//! Queued records are replayed by the reconciler through [`RetryController::replay`],
//! which makes exactly one attempt and leaves bookkeeping to the caller.

use crate::client::{CheckinPayload, TransportError, UpstreamClient};
use punchgate_core::AttendanceRecord;
use punchgate_core::constants::{DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_RETRY_BACKOFF_BASE};
use punchgate_storage::{FailureStore, QueuedDeliveryRequest};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upstream calls per live record, at least 1
    pub max_attempts: u32,
    /// Exponential base for the backoff delay
    pub backoff_base: u32,
    /// Unit the backoff is measured in (one second in production)
    pub time_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            backoff_base: DEFAULT_RETRY_BACKOFF_BASE,
            time_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based).
    ///
    /// ```
    /// use punchgate_delivery::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
    /// assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
    /// ```
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.time_unit
            .saturating_mul(self.backoff_base.saturating_pow(attempt))
    }
}

/// Result of delivering one live record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Upstream accepted the record
    Delivered,
    /// Every attempt failed; the record is in the failure queue
    Queued,
    /// The timestamp could not be parsed; dropped without queueing
    Rejected,
    /// Every attempt failed and the failure queue write failed too
    Lost,
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// Result of replaying one queued request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    Delivered,
    /// The attempt failed; carries the diagnostic for `last_error`
    Failed(String),
    /// The stored timestamp is unusable; no upstream call was made
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed(TransportError),
}

/// One upstream call, as reported in traces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAttempt {
    pub attempt: u32,
    /// Wait before the next attempt, `None` after the last one
    pub delay: Option<Duration>,
    pub outcome: AttemptOutcome,
}

/// Delivery with retries, backed by a failure queue.
pub struct RetryController<S, U> {
    store: S,
    upstream: U,
    policy: RetryPolicy,
}

impl<S: FailureStore, U: UpstreamClient> RetryController<S, U> {
    pub fn new(store: S, upstream: U, policy: RetryPolicy) -> Self {
        Self {
            store,
            upstream,
            policy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver a record from a live device batch.
    pub async fn deliver(&self, record: &AttendanceRecord) -> DeliveryOutcome {
        let payload = match CheckinPayload::from_record(record) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    punch_code = %record.punch_code,
                    device_id = %record.device_id,
                    error = %e,
                    "Dropping record with unparseable timestamp"
                );
                return DeliveryOutcome::Rejected;
            }
        };

        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.upstream.send(&payload).await {
                Ok(()) => {
                    trace_attempt(RetryAttempt {
                        attempt,
                        delay: None,
                        outcome: AttemptOutcome::Succeeded,
                    });
                    return DeliveryOutcome::Delivered;
                }
                Err(e) => {
                    let delay = (attempt < max_attempts).then(|| self.policy.backoff_delay(attempt));
                    trace_attempt(RetryAttempt {
                        attempt,
                        delay,
                        outcome: AttemptOutcome::Failed(e.clone()),
                    });
                    last_error = Some(e);
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        let error = last_error.map(|e| e.to_string()).unwrap_or_default();
        match self.store.enqueue(record, &error).await {
            Ok(_) => DeliveryOutcome::Queued,
            Err(e) => {
                tracing::error!(
                    punch_code = %record.punch_code,
                    employee = %record.employee_name,
                    timestamp = %record.timestamp,
                    device_id = %record.device_id,
                    error = %e,
                    "Failed to queue undelivered record, record lost"
                );
                DeliveryOutcome::Lost
            }
        }
    }

    /// Make a single delivery attempt for a queued request.
    pub async fn replay(&self, queued: &QueuedDeliveryRequest) -> ReplayOutcome {
        let payload = match CheckinPayload::from_record(&queued.to_record()) {
            Ok(payload) => payload,
            Err(e) => return ReplayOutcome::Rejected(e.to_string()),
        };

        match self.upstream.send(&payload).await {
            Ok(()) => ReplayOutcome::Delivered,
            Err(e) => ReplayOutcome::Failed(e.to_string()),
        }
    }
}

fn trace_attempt(attempt: RetryAttempt) {
    match &attempt.outcome {
        AttemptOutcome::Succeeded => tracing::debug!(attempt = attempt.attempt, "Delivery attempt succeeded"),
        AttemptOutcome::Failed(e) => tracing::warn!(
            attempt = attempt.attempt,
            delay = ?attempt.delay,
            error = %e,
            "Delivery attempt failed"
        ),
    }
}
