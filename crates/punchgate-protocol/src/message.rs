//! Decoding of inbound device messages.
//!
//! Decoding happens in two steps. The text must first be a JSON object
//! (otherwise [`ProtocolError::Decode`]) carrying a `cmd` field (otherwise
//! [`ProtocolError::MissingCommand`]). The payload is then read leniently:
//! absent or mistyped fields become `None` and are judged later by the
//! handler, so one bad field never makes a whole message undecodable.
//!
//! Terminals are not consistent about JSON types. Some firmware sends
//! `enrollid` as a number, so scalar fields accept both strings and numbers.

use crate::commands::{
    AttendanceBatch, Command, CommandKind, Enrollment, LogEntry, Registration,
};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors that make a message impossible to dispatch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload is not a JSON object
    #[error("Invalid JSON: {0}")]
    Decode(String),

    /// Payload has no `cmd` field
    #[error("Missing 'cmd' field")]
    MissingCommand,
}

/// Decode one inbound message into a [`Command`].
///
/// # Errors
///
/// Returns `ProtocolError::Decode` if the text is not a JSON object and
/// `ProtocolError::MissingCommand` if it has no usable `cmd` field.
///
/// # Examples
///
/// ```
/// use punchgate_protocol::{Command, ProtocolError, decode};
///
/// let command = decode(r#"{"cmd":"sendlog"}"#).unwrap();
/// match command {
///     Command::AttendanceLog(batch) => assert!(batch.entries.is_empty()),
///     _ => unreachable!(),
/// }
///
/// assert!(matches!(decode("{not json"), Err(ProtocolError::Decode(_))));
/// assert_eq!(decode(r#"{"sn":"X"}"#), Err(ProtocolError::MissingCommand));
/// ```
pub fn decode(text: &str) -> Result<Command, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Decode(e.to_string()))?;

    let Value::Object(object) = value else {
        return Err(ProtocolError::Decode(
            "expected a JSON object".to_string(),
        ));
    };

    let tag = match object.get("cmd") {
        None | Some(Value::Null) => return Err(ProtocolError::MissingCommand),
        Some(Value::String(tag)) => tag.clone(),
        Some(other) => other.to_string(),
    };

    let command = match CommandKind::parse(&tag) {
        Some(CommandKind::Register) => Command::Register(Registration {
            serial: scalar_field(&object, "sn"),
        }),
        Some(kind @ (CommandKind::SendLog | CommandKind::GetAllLog)) => {
            Command::AttendanceLog(AttendanceBatch {
                kind,
                entries: log_entries(&object),
            })
        }
        Some(CommandKind::SendUser) => Command::UserEnrollment(Enrollment {
            enroll_id: scalar_field(&object, "enrollid"),
            name: scalar_field(&object, "name"),
            admin: object.get("admin").and_then(Value::as_i64),
            backup_num: object.get("backupnum").and_then(Value::as_i64),
        }),
        None => Command::Unknown(tag),
    };

    Ok(command)
}

/// Read a field that should be text, accepting numbers as their decimal form.
fn scalar_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extract the `record` list. A missing or non-array value yields no entries;
/// a non-object element yields an empty entry so it is counted as malformed.
fn log_entries(object: &Map<String, Value>) -> Vec<LogEntry> {
    let Some(Value::Array(records)) = object.get("record") else {
        return Vec::new();
    };

    records
        .iter()
        .map(|record| match record {
            Value::Object(fields) => LogEntry {
                enroll_id: scalar_field(fields, "enrollid"),
                name: scalar_field(fields, "name"),
                time: scalar_field(fields, "time"),
            },
            _ => LogEntry::default(),
        })
        .collect()
}
