//! Upstream delivery for the punchgate gateway.
//!
//! Attendance records travel from a device batch to the HR system through
//! three pieces:
//!
//! - [`UpstreamClient`] performs one HTTP POST per record ([`HttpUpstreamClient`]).
//! - [`RetryController`] wraps the client with bounded attempts and
//!   exponential backoff, and hands exhausted records to the failure queue.
//! - [`Reconciler`] drains the failure queue in the background, one attempt
//!   per queued request per pass.

pub mod client;
pub mod reconciler;
pub mod retry;

#[cfg(test)]
mod testing;

pub use client::{CheckinPayload, HttpUpstreamClient, TransportError, UpstreamClient, UpstreamConfig};
pub use reconciler::{PassSummary, Reconciler, ReconcilerConfig};
pub use retry::{AttemptOutcome, DeliveryOutcome, ReplayOutcome, RetryAttempt, RetryController, RetryPolicy};
