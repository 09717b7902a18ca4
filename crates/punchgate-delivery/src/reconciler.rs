//! Background replay of the failure queue.
//!
//! Each pass takes a small batch of pending requests, oldest first, and gives
//! each one a single upstream attempt. A delivered request is removed from the
//! queue; anything else bumps its retry count. Requests whose retry count has
//! reached the limit are no longer selected but stay in the queue.
//!
//! A storage error while updating one request is logged and counted as a
//! failure; the rest of the batch still runs.
//!
//! The loop sleeps `idle_interval` when the queue is empty and
//! `pass_interval` after a pass or after a failed fetch. It only stops
//! when its cancellation token fires.

use crate::client::UpstreamClient;
use crate::retry::{ReplayOutcome, RetryController};
use punchgate_core::constants::{
    DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_RECONCILE_BATCH_SIZE, DEFAULT_RECONCILE_IDLE_SECS,
    DEFAULT_RECONCILE_PASS_SECS,
};
use punchgate_storage::{FailureStore, StorageResult};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Requests replayed per pass
    pub batch_size: u32,
    /// Requests at or above this retry count are left alone
    pub max_retry_count: u32,
    /// Wait when the queue has nothing pending
    pub idle_interval: Duration,
    /// Wait after a pass, or after a failed pass
    pub pass_interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_RECONCILE_BATCH_SIZE,
            max_retry_count: DEFAULT_MAX_RETRY_ATTEMPTS,
            idle_interval: Duration::from_secs(DEFAULT_RECONCILE_IDLE_SECS),
            pass_interval: Duration::from_secs(DEFAULT_RECONCILE_PASS_SECS),
        }
    }
}

/// What one pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub fetched: usize,
    pub delivered: usize,
    pub failed: usize,
}

pub struct Reconciler<S, U> {
    controller: Arc<RetryController<S, U>>,
    config: ReconcilerConfig,
}

impl<S: FailureStore, U: UpstreamClient> Reconciler<S, U> {
    pub fn new(controller: Arc<RetryController<S, U>>, config: ReconcilerConfig) -> Self {
        Self { controller, config }
    }

    /// Replay one batch of pending requests.
    ///
    /// # Errors
    /// Returns an error only if the pending batch cannot be fetched.
    pub async fn run_pass(&self) -> StorageResult<PassSummary> {
        let store = self.controller.store();
        let pending = store
            .list_pending(self.config.batch_size, self.config.max_retry_count)
            .await?;

        let mut summary = PassSummary {
            fetched: pending.len(),
            ..Default::default()
        };

        for queued in &pending {
            match self.controller.replay(queued).await {
                ReplayOutcome::Delivered => match store.remove(queued.id).await {
                    Ok(_) => {
                        summary.delivered += 1;
                        tracing::info!(
                            queue_id = queued.id,
                            punch_code = %queued.punch_code,
                            device_id = %queued.device_id,
                            "Queued delivery succeeded"
                        );
                    }
                    Err(e) => {
                        // Delivered upstream but still queued: it will be sent again.
                        summary.failed += 1;
                        tracing::error!(
                            queue_id = queued.id,
                            error = %e,
                            "Failed to remove delivered request from queue"
                        );
                    }
                },
                ReplayOutcome::Failed(error) | ReplayOutcome::Rejected(error) => {
                    summary.failed += 1;
                    match store.increment_retry(queued.id, &error).await {
                        Ok(()) => tracing::warn!(
                            queue_id = queued.id,
                            retry_count = queued.retry_count + 1,
                            error = %error,
                            "Queued delivery failed"
                        ),
                        Err(e) => tracing::error!(
                            queue_id = queued.id,
                            error = %e,
                            "Failed to record retry for queued request"
                        ),
                    }
                }
            }
        }

        Ok(summary)
    }

    /// Run passes until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            batch_size = self.config.batch_size,
            max_retry_count = self.config.max_retry_count,
            "Reconciler started"
        );

        while !shutdown.is_cancelled() {
            let wait = match self.run_pass().await {
                Ok(summary) if summary.fetched == 0 => self.config.idle_interval,
                Ok(summary) => {
                    tracing::info!(
                        fetched = summary.fetched,
                        delivered = summary.delivered,
                        failed = summary.failed,
                        "Reconciliation pass complete"
                    );
                    self.config.pass_interval
                }
                Err(e) => {
                    tracing::error!(error = %e, "Reconciliation pass failed");
                    self.config.pass_interval
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        tracing::info!("Reconciler stopped");
    }
}
