use crate::{
    Result,
    constants::{DEVICE_TIME_FORMAT, UPSTREAM_TIME_FORMAT},
    error::Error,
};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device serial number asserted during registration.
///
/// The serial is the only identity a terminal has. It is trimmed on
/// construction and must not be empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerialNumber(String);

impl SerialNumber {
    /// Create a serial number with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidSerialNumber` if the value is empty or only whitespace.
    pub fn new(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(Error::InvalidSerialNumber(
                "serial number must not be empty".to_string(),
            ));
        }
        Ok(SerialNumber(value.to_string()))
    }

    /// Get the serial number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SerialNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SerialNumber::new(s)
    }
}

/// Punch timestamp as reported by a device ("2024-03-01 09:00:00").
///
/// Devices report wall-clock time without an offset, so the value is kept
/// naive and only reformatted, never converted between zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceTimestamp(NaiveDateTime);

impl DeviceTimestamp {
    /// Parse from the device format: "2024-03-01 09:00:00".
    ///
    /// # Errors
    /// Returns `Error::InvalidTimestamp` if the string does not match
    /// "yyyy-mm-dd hh:mm:ss".
    pub fn parse(s: &str) -> Result<Self> {
        NaiveDateTime::parse_from_str(s, DEVICE_TIME_FORMAT)
            .map(DeviceTimestamp)
            .map_err(|e| Error::InvalidTimestamp {
                value: s.to_string(),
                reason: e.to_string(),
            })
    }

    /// Format for the device protocol (yyyy-mm-dd hh:mm:ss).
    #[must_use]
    pub fn format(&self) -> String {
        self.0.format(DEVICE_TIME_FORMAT).to_string()
    }

    /// Format for the upstream checkin endpoint (dd-mm-yyyy hh:mm:ss).
    #[must_use]
    pub fn to_upstream(&self) -> String {
        self.0.format(UPSTREAM_TIME_FORMAT).to_string()
    }
}

impl fmt::Display for DeviceTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

/// Current server time in the device format, sent back as `cloudtime`.
#[must_use]
pub fn cloud_time() -> String {
    Local::now().format(DEVICE_TIME_FORMAT).to_string()
}

/// A single punch event extracted from an attendance batch.
///
/// The timestamp is kept exactly as the device sent it. It is validated at
/// delivery time so that a record with a malformed timestamp can be rejected
/// without being queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    /// Device-local biometric enrollment id
    pub punch_code: String,

    /// Employee display name as reported by the device
    pub employee_name: String,

    /// Raw punch timestamp string
    pub timestamp: String,

    /// Serial number of the originating device
    pub device_id: String,
}

impl AttendanceRecord {
    pub fn new(
        punch_code: impl Into<String>,
        employee_name: impl Into<String>,
        timestamp: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            punch_code: punch_code.into(),
            employee_name: employee_name.into(),
            timestamp: timestamp.into(),
            device_id: device_id.into(),
        }
    }

    /// Parse the raw timestamp.
    ///
    /// # Errors
    /// Returns `Error::InvalidTimestamp` if the timestamp is not in device format.
    pub fn parsed_timestamp(&self) -> Result<DeviceTimestamp> {
        DeviceTimestamp::parse(&self.timestamp)
    }
}

impl fmt::Display for AttendanceRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} ({}) at {} from {}",
            self.employee_name, self.punch_code, self.timestamp, self.device_id
        )
    }
}
