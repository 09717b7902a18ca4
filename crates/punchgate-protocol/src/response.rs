//! Responses written back to devices.
//!
//! Every response carries `ret` (the command being answered, or `"error"`)
//! and a `result` flag. Failures add a `reason`; successful registration,
//! attendance and enrollment replies add the server's `cloudtime`, which
//! terminals use to correct their clocks.

use punchgate_core::constants::{CMD_REGISTER, CMD_SEND_LOG, CMD_SEND_USER, RET_ERROR};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Human-readable failure reasons sent to devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    InvalidJson,
    MissingCommand,
    UnknownCommand,
    MissingSerialNumber,
    MissingEnrollmentId,
    InternalError,
    ConnectionLimitReached,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::InvalidJson => "Invalid JSON format",
            FailureReason::MissingCommand => "Missing 'cmd' field",
            FailureReason::UnknownCommand => "Unknown command",
            FailureReason::MissingSerialNumber => "Missing serial number",
            FailureReason::MissingEnrollmentId => "Missing enrollment ID",
            FailureReason::InternalError => "Internal server error",
            FailureReason::ConnectionLimitReached => "Server connection limit reached",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reply to a device message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub ret: String,
    pub result: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloudtime: Option<String>,
}

impl Response {
    fn new(ret: &str, result: bool) -> Self {
        Self {
            ret: ret.to_string(),
            result,
            reason: None,
            processed: None,
            failed: None,
            cloudtime: None,
        }
    }

    fn failure(ret: &str, reason: FailureReason) -> Self {
        Self {
            reason: Some(reason.as_str().to_string()),
            ..Self::new(ret, false)
        }
    }

    /// Successful registration.
    pub fn registered(cloudtime: String) -> Self {
        Self {
            cloudtime: Some(cloudtime),
            ..Self::new(CMD_REGISTER, true)
        }
    }

    /// Failed registration with a free-form reason.
    pub fn registration_failed(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::new(CMD_REGISTER, false)
        }
    }

    /// Attendance batch summary. Always answered as `sendlog`, whichever of
    /// the two attendance commands carried the batch.
    pub fn batch(processed: u32, failed: u32, cloudtime: String) -> Self {
        Self {
            processed: Some(processed),
            failed: Some(failed),
            cloudtime: Some(cloudtime),
            ..Self::new(CMD_SEND_LOG, true)
        }
    }

    /// Accepted enrollment notification.
    pub fn enrolled(cloudtime: String) -> Self {
        Self {
            cloudtime: Some(cloudtime),
            ..Self::new(CMD_SEND_USER, true)
        }
    }

    pub fn enrollment_failed() -> Self {
        Self::failure(CMD_SEND_USER, FailureReason::MissingEnrollmentId)
    }

    pub fn decode_error() -> Self {
        Self::failure(RET_ERROR, FailureReason::InvalidJson)
    }

    pub fn missing_command() -> Self {
        Self::failure(RET_ERROR, FailureReason::MissingCommand)
    }

    /// Echo an unrecognized command tag back with `result: false`.
    pub fn unknown_command(tag: &str) -> Self {
        Self::failure(tag, FailureReason::UnknownCommand)
    }

    pub fn internal_error() -> Self {
        Self::failure(RET_ERROR, FailureReason::InternalError)
    }

    /// Sent to a device refused at admission, just before the server closes.
    pub fn connection_limit_reached() -> Self {
        Self::failure(RET_ERROR, FailureReason::ConnectionLimitReached)
    }

    /// Serialize to the JSON text sent over the wire.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn to_value(response: &Response) -> Value {
        serde_json::from_str(&response.encode().unwrap()).unwrap()
    }

    #[test]
    fn test_registered_response() {
        let value = to_value(&Response::registered("2024-03-01 09:00:00".to_string()));
        assert_eq!(
            value,
            json!({"ret":"reg","result":true,"cloudtime":"2024-03-01 09:00:00"})
        );
    }

    #[test]
    fn test_registration_failed_response() {
        let value = to_value(&Response::registration_failed(
            FailureReason::MissingSerialNumber.as_str(),
        ));
        assert_eq!(
            value,
            json!({"ret":"reg","result":false,"reason":"Missing serial number"})
        );
    }

    #[test]
    fn test_batch_response() {
        let value = to_value(&Response::batch(1, 1, "2024-03-01 09:00:00".to_string()));
        assert_eq!(
            value,
            json!({
                "ret":"sendlog",
                "result":true,
                "processed":1,
                "failed":1,
                "cloudtime":"2024-03-01 09:00:00"
            })
        );
    }

    #[test]
    fn test_enrollment_responses() {
        let ok = to_value(&Response::enrolled("2024-03-01 09:00:00".to_string()));
        assert_eq!(ok["ret"], "senduser");
        assert_eq!(ok["result"], true);

        let failed = to_value(&Response::enrollment_failed());
        assert_eq!(
            failed,
            json!({"ret":"senduser","result":false,"reason":"Missing enrollment ID"})
        );
    }

    #[test]
    fn test_protocol_error_responses() {
        assert_eq!(
            to_value(&Response::decode_error()),
            json!({"ret":"error","result":false,"reason":"Invalid JSON format"})
        );
        assert_eq!(
            to_value(&Response::missing_command()),
            json!({"ret":"error","result":false,"reason":"Missing 'cmd' field"})
        );
        assert_eq!(
            to_value(&Response::internal_error()),
            json!({"ret":"error","result":false,"reason":"Internal server error"})
        );
        assert_eq!(
            to_value(&Response::connection_limit_reached()),
            json!({"ret":"error","result":false,"reason":"Server connection limit reached"})
        );
    }

    #[test]
    fn test_unknown_command_echoes_tag() {
        let encoded = Response::unknown_command("ping").encode().unwrap();
        assert_eq!(
            encoded,
            r#"{"ret":"ping","result":false,"reason":"Unknown command"}"#
        );
    }
}
