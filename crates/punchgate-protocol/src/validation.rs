//! Per-record validation for attendance batches.
//!
//! A record needs a non-empty enrollment id, name and time. Anything else is
//! skipped and counted as a failure by the caller; the batch continues.
//! The timestamp format is not checked here: that happens at delivery time.

use crate::commands::LogEntry;
use punchgate_core::AttendanceRecord;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Turn a raw log entry into an [`AttendanceRecord`] attributed to `device_id`.
///
/// # Errors
///
/// Returns `RecordError::MissingField` naming the first absent or blank field.
pub fn validate_entry(entry: &LogEntry, device_id: &str) -> Result<AttendanceRecord, RecordError> {
    let punch_code = required(&entry.enroll_id, "enrollid")?;
    let name = required(&entry.name, "name")?;
    let time = required(&entry.time, "time")?;

    Ok(AttendanceRecord::new(punch_code, name, time, device_id))
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, RecordError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or(RecordError::MissingField(field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_valid_entry() {
        let entry = LogEntry::new("17", "Asha", "2024-03-01 09:00:00");
        let record = validate_entry(&entry, "ZX01").unwrap();

        assert_eq!(record.punch_code, "17");
        assert_eq!(record.employee_name, "Asha");
        assert_eq!(record.timestamp, "2024-03-01 09:00:00");
        assert_eq!(record.device_id, "ZX01");
    }

    #[test]
    fn test_unparseable_time_is_not_a_validation_error() {
        let entry = LogEntry::new("17", "Asha", "yesterday");
        assert!(validate_entry(&entry, "ZX01").is_ok());
    }

    #[rstest]
    #[case(LogEntry::new("", "Bad", "2024-03-01 09:05:00"), "enrollid")]
    #[case(LogEntry::new("17", "  ", "2024-03-01 09:05:00"), "name")]
    #[case(LogEntry::new("17", "Asha", ""), "time")]
    #[case(LogEntry::default(), "enrollid")]
    fn test_missing_fields(#[case] entry: LogEntry, #[case] field: &'static str) {
        assert_eq!(
            validate_entry(&entry, "ZX01"),
            Err(RecordError::MissingField(field))
        );
    }
}
