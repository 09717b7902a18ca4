//! Per-message command dispatch.
//!
//! The router is stateless across messages. The only per-connection state it
//! reads is the serial number the session registered with, which becomes the
//! `device_id` of every forwarded punch.

use crate::registry::{RegistrationError, SessionId, SessionRegistry};
use futures::FutureExt;
use punchgate_core::constants::UNKNOWN_DEVICE_ID;
use punchgate_core::cloud_time;
use punchgate_delivery::{RetryController, UpstreamClient};
use punchgate_protocol::{
    AttendanceBatch, Command, Enrollment, FailureReason, ProtocolError, Registration, Response,
    decode, validate_entry,
};
use punchgate_storage::FailureStore;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub struct CommandRouter<S, U> {
    registry: Arc<SessionRegistry>,
    delivery: Arc<RetryController<S, U>>,
}

impl<S, U> Clone for CommandRouter<S, U> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            delivery: Arc::clone(&self.delivery),
        }
    }
}

impl<S: FailureStore, U: UpstreamClient> CommandRouter<S, U> {
    pub fn new(registry: Arc<SessionRegistry>, delivery: Arc<RetryController<S, U>>) -> Self {
        Self { registry, delivery }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Answer one inbound message from `session`.
    ///
    /// Never fails: protocol errors become error responses, and a panic
    /// while handling the message becomes `"Internal server error"`.
    pub async fn handle(&self, session: SessionId, text: &str) -> Response {
        match AssertUnwindSafe(self.route(session, text)).catch_unwind().await {
            Ok(response) => response,
            Err(_) => {
                tracing::error!(session = %session, "Handler panicked");
                Response::internal_error()
            }
        }
    }

    async fn route(&self, session: SessionId, text: &str) -> Response {
        let command = match decode(text) {
            Ok(command) => command,
            Err(ProtocolError::Decode(e)) => {
                tracing::warn!(session = %session, error = %e, "Invalid JSON from device");
                return Response::decode_error();
            }
            Err(ProtocolError::MissingCommand) => {
                tracing::warn!(session = %session, "Message without command");
                return Response::missing_command();
            }
        };

        tracing::trace!(session = %session, command = %command.tag(), "Dispatching command");

        match command {
            Command::Register(registration) => self.register(session, registration),
            Command::AttendanceLog(batch) => self.attendance(session, batch).await,
            Command::UserEnrollment(enrollment) => self.enrollment(session, enrollment),
            Command::Unknown(tag) => {
                tracing::warn!(session = %session, command = %tag, "Unknown command");
                Response::unknown_command(&tag)
            }
        }
    }

    fn register(&self, session: SessionId, registration: Registration) -> Response {
        let serial = registration.serial.unwrap_or_default();

        match self.registry.register(session, &serial) {
            Ok(()) => {
                tracing::info!(session = %session, serial = %serial.trim(), "Device registered");
                Response::registered(cloud_time())
            }
            Err(RegistrationError::MissingIdentity) => {
                tracing::warn!(session = %session, "Registration without serial number");
                Response::registration_failed(FailureReason::MissingSerialNumber.as_str())
            }
            Err(e) => {
                tracing::warn!(session = %session, error = %e, "Registration refused");
                Response::registration_failed(e.to_string())
            }
        }
    }

    async fn attendance(&self, session: SessionId, batch: AttendanceBatch) -> Response {
        let device_id = self
            .registry
            .serial_of(session)
            .map(|serial| serial.to_string())
            .unwrap_or_else(|| UNKNOWN_DEVICE_ID.to_string());

        let mut processed = 0u32;
        let mut failed = 0u32;

        for entry in &batch.entries {
            let record = match validate_entry(entry, &device_id) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(session = %session, device_id = %device_id, error = %e, "Skipping malformed record");
                    failed += 1;
                    continue;
                }
            };

            if self.delivery.deliver(&record).await.is_delivered() {
                processed += 1;
            } else {
                failed += 1;
            }
        }

        tracing::info!(
            session = %session,
            device_id = %device_id,
            command = %batch.kind,
            processed,
            failed,
            "Attendance batch handled"
        );
        Response::batch(processed, failed, cloud_time())
    }

    fn enrollment(&self, session: SessionId, enrollment: Enrollment) -> Response {
        let Some(enroll_id) = enrollment.enroll_id.filter(|id| !id.trim().is_empty()) else {
            tracing::warn!(session = %session, "Enrollment without enrollment id");
            return Response::enrollment_failed();
        };

        tracing::info!(
            session = %session,
            enroll_id = %enroll_id,
            name = enrollment.name.as_deref().unwrap_or(""),
            admin = ?enrollment.admin,
            backup_num = ?enrollment.backup_num,
            "User enrollment received"
        );
        Response::enrolled(cloud_time())
    }
}
