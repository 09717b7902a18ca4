//! Command definitions for the device protocol.
//!
//! Every inbound message carries a `cmd` tag. The tags the gateway understands
//! form the closed [`CommandKind`] set; a decoded message becomes a
//! [`Command`] carrying the payload for its kind, or [`Command::Unknown`]
//! carrying the tag it could not recognize.
//!
//! # Wire Format Examples
//!
//! ```text
//! {"cmd":"reg","sn":"ZX0006827500"}
//! {"cmd":"sendlog","record":[{"enrollid":"17","name":"Asha","time":"2024-03-01 09:00:00"}]}
//! {"cmd":"getalllog","record":[...]}
//! {"cmd":"senduser","enrollid":"17","name":"Asha","admin":0,"backupnum":50}
//! ```
//!
//! # Usage
//!
//! ```
//! use punchgate_protocol::CommandKind;
//!
//! let kind = CommandKind::parse("getalllog").unwrap();
//! assert_eq!(kind, CommandKind::GetAllLog);
//! assert!(kind.is_attendance());
//! assert_eq!(kind.as_str(), "getalllog");
//!
//! assert!(CommandKind::parse("ping").is_none());
//! ```

use punchgate_core::constants::{CMD_GET_ALL_LOG, CMD_REGISTER, CMD_SEND_LOG, CMD_SEND_USER};
use std::fmt;

/// Command tags understood by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Device registration (`reg`)
    Register,
    /// Attendance pushed as punches happen (`sendlog`)
    SendLog,
    /// Attendance sent for a full log download (`getalllog`)
    GetAllLog,
    /// User enrollment notification (`senduser`)
    SendUser,
}

impl CommandKind {
    /// Parse a wire tag. Returns `None` for tags the gateway does not handle.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            CMD_REGISTER => Some(Self::Register),
            CMD_SEND_LOG => Some(Self::SendLog),
            CMD_GET_ALL_LOG => Some(Self::GetAllLog),
            CMD_SEND_USER => Some(Self::SendUser),
            _ => None,
        }
    }

    /// Wire tag for this command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => CMD_REGISTER,
            Self::SendLog => CMD_SEND_LOG,
            Self::GetAllLog => CMD_GET_ALL_LOG,
            Self::SendUser => CMD_SEND_USER,
        }
    }

    /// Returns `true` for the two attendance batch commands.
    pub fn is_attendance(&self) -> bool {
        matches!(self, Self::SendLog | Self::GetAllLog)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Registration payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registration {
    /// Serial number as sent by the device (`sn`), possibly empty
    pub serial: Option<String>,
}

/// One raw punch record from an attendance batch.
///
/// Every field is optional at this stage; [`crate::validate_entry`] decides
/// whether the entry is well-formed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogEntry {
    /// Enrollment id (`enrollid`)
    pub enroll_id: Option<String>,
    /// Employee name (`name`)
    pub name: Option<String>,
    /// Punch time (`time`)
    pub time: Option<String>,
}

impl LogEntry {
    pub fn new(enroll_id: &str, name: &str, time: &str) -> Self {
        Self {
            enroll_id: Some(enroll_id.to_string()),
            name: Some(name.to_string()),
            time: Some(time.to_string()),
        }
    }
}

/// Attendance batch payload (`sendlog` / `getalllog`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceBatch {
    /// Which of the two attendance commands delivered the batch
    pub kind: CommandKind,
    /// Records in device order
    pub entries: Vec<LogEntry>,
}

/// Enrollment payload (`senduser`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrollment {
    pub enroll_id: Option<String>,
    pub name: Option<String>,
    pub admin: Option<i64>,
    pub backup_num: Option<i64>,
}

/// A decoded device command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register(Registration),
    AttendanceLog(AttendanceBatch),
    UserEnrollment(Enrollment),
    /// A command tag the gateway does not handle
    Unknown(String),
}

impl Command {
    /// The recognized kind, or `None` for [`Command::Unknown`].
    pub fn kind(&self) -> Option<CommandKind> {
        match self {
            Command::Register(_) => Some(CommandKind::Register),
            Command::AttendanceLog(batch) => Some(batch.kind),
            Command::UserEnrollment(_) => Some(CommandKind::SendUser),
            Command::Unknown(_) => None,
        }
    }

    /// The tag as it appeared on the wire.
    pub fn tag(&self) -> &str {
        match self {
            Command::Unknown(tag) => tag,
            other => other.kind().map_or("", |kind| kind.as_str()),
        }
    }
}
