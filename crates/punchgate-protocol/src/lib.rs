//! Device wire protocol for the punchgate gateway.
//!
//! Terminals send one JSON object per message and receive one JSON object in
//! reply. This crate turns inbound text into a closed [`Command`] enum and
//! builds the [`Response`] objects written back to the device.
//!
//! ```
//! use punchgate_protocol::{Command, Response, decode};
//!
//! let command = decode(r#"{"cmd":"reg","sn":"ZX0006827500"}"#).unwrap();
//! assert!(matches!(command, Command::Register(_)));
//!
//! let reply = Response::unknown_command("ping").encode().unwrap();
//! assert_eq!(reply, r#"{"ret":"ping","result":false,"reason":"Unknown command"}"#);
//! ```

pub mod commands;
pub mod message;
pub mod response;
pub mod validation;

pub use commands::{AttendanceBatch, Command, CommandKind, Enrollment, LogEntry, Registration};
pub use message::{ProtocolError, decode};
pub use response::{FailureReason, Response};
pub use validation::{RecordError, validate_entry};
