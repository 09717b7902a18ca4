//! Core constants for the device gateway.
//!
//! This module defines the protocol-level constants and the operational
//! defaults shared by the gateway components. Every configurable value has a
//! `DEFAULT_*` constant here so that configuration structs, tests and
//! documentation agree on a single source.
//!
//! # Wire Protocol
//!
//! Devices exchange one JSON object per WebSocket message:
//!
//! ```text
//! device  -> {"cmd":"reg","sn":"ZX0006827500"}
//! gateway -> {"ret":"reg","result":true,"cloudtime":"2024-03-01 09:00:00"}
//! ```
//!
//! # Usage
//!
//! ```
//! use punchgate_core::constants::*;
//! use std::time::Duration;
//!
//! assert_eq!(CMD_REGISTER, "reg");
//!
//! let timeout = Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS);
//! assert_eq!(timeout.as_secs(), 10);
//! ```

// ============================================================================
// Command Tags
// ============================================================================

/// Device registration command.
pub const CMD_REGISTER: &str = "reg";

/// Attendance batch pushed by the device as punches happen.
pub const CMD_SEND_LOG: &str = "sendlog";

/// Attendance batch sent in reply to a full log download.
///
/// Handled exactly like [`CMD_SEND_LOG`].
pub const CMD_GET_ALL_LOG: &str = "getalllog";

/// User enrollment notification.
pub const CMD_SEND_USER: &str = "senduser";

/// `ret` value used for protocol-level errors that have no command to echo.
pub const RET_ERROR: &str = "error";

// ============================================================================
// Timestamp Formats
// ============================================================================

/// Timestamp format used by devices on the wire and for `cloudtime`.
///
/// # Examples
///
/// ```
/// use punchgate_core::constants::DEVICE_TIME_FORMAT;
/// use chrono::NaiveDateTime;
///
/// let ts = NaiveDateTime::parse_from_str("2024-03-01 09:00:00", DEVICE_TIME_FORMAT);
/// assert!(ts.is_ok());
/// ```
pub const DEVICE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timestamp format expected by the upstream HR checkin endpoint.
pub const UPSTREAM_TIME_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// Device identifier reported upstream for sessions that never registered.
pub const UNKNOWN_DEVICE_ID: &str = "unknown";

// ============================================================================
// Listener Defaults
// ============================================================================

/// Default TCP port the gateway listens on.
pub const DEFAULT_PORT: u16 = 8190;

/// Default maximum number of simultaneous device sessions.
///
/// # Value: 50
pub const DEFAULT_MAX_CONNECTIONS: usize = 50;

/// Default idle timeout for a device session (seconds).
///
/// A session that sends nothing for this long is closed.
///
/// # Value: 300 seconds (5 minutes)
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Interval between keepalive pings sent to each device (seconds).
///
/// # Value: 30 seconds
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 30;

/// How long a device has to answer a keepalive ping before the session is
/// dropped (seconds).
///
/// # Value: 10 seconds
pub const DEFAULT_PING_TIMEOUT_SECS: u64 = 10;

/// Maximum size of a single inbound message (bytes).
///
/// Attendance batches from a full log download can be large, so the limit is
/// generous while still bounding memory per connection.
///
/// # Value: 1 MiB
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

// ============================================================================
// Upstream Defaults
// ============================================================================

/// Default base URL of the upstream HR system.
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "http://127.0.0.1:8001/";

/// Default path of the upstream checkin endpoint, joined to the base URL.
pub const DEFAULT_UPSTREAM_API_PATH: &str = "/api/method/add_checkin";

/// Default timeout for a single upstream HTTP call (seconds).
///
/// # Value: 10 seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Maximum number of response body characters kept in a transport diagnostic.
pub const MAX_ERROR_BODY_CHARS: usize = 200;

// ============================================================================
// Retry Defaults
// ============================================================================

/// Default number of immediate delivery attempts per record.
///
/// The same value bounds how many reconciliation passes a queued request may
/// go through before it is left for operator inspection.
///
/// # Value: 3
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;

/// Default exponential backoff base.
///
/// The delay after attempt `n` is `base^n` time units: 2s, 4s, 8s, ...
///
/// # Value: 2
pub const DEFAULT_RETRY_BACKOFF_BASE: u32 = 2;

// ============================================================================
// Reconciler Defaults
// ============================================================================

/// Default number of queued requests replayed per reconciliation pass.
pub const DEFAULT_RECONCILE_BATCH_SIZE: u32 = 5;

/// Default wait when the failure queue is empty (seconds).
pub const DEFAULT_RECONCILE_IDLE_SECS: u64 = 30;

/// Default wait after a pass, or after a failed pass (seconds).
pub const DEFAULT_RECONCILE_PASS_SECS: u64 = 60;
