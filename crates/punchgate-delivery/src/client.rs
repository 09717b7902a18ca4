//! HTTP forwarding to the upstream checkin endpoint.

use punchgate_core::constants::{
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_UPSTREAM_API_PATH, DEFAULT_UPSTREAM_BASE_URL,
    MAX_ERROR_BODY_CHARS,
};
use punchgate_core::{AttendanceRecord, DeviceTimestamp};
use reqwest::StatusCode;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Why a single upstream call did not succeed.
///
/// The `Display` text is the short diagnostic stored as `last_error` on
/// queued requests.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Upstream answered with something other than 200
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Request timeout")]
    Timeout,

    #[error("Connection error")]
    Connection,

    /// Any other client-side failure
    #[error("{0}")]
    Request(String),
}

impl TransportError {
    /// Build a status error, keeping at most `MAX_ERROR_BODY_CHARS` characters of the body.
    pub fn status(code: u16, body: &str) -> Self {
        TransportError::Status {
            code,
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connection
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// Form body of one checkin POST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckinPayload {
    #[serde(rename = "punchingcode")]
    pub punch_code: String,
    pub employee_name: String,
    /// Punch time as dd-mm-yyyy hh:mm:ss
    pub time: String,
    pub device_id: String,
}

impl CheckinPayload {
    /// Build the payload, reformatting the device timestamp for upstream.
    ///
    /// # Errors
    /// Returns `Error::InvalidTimestamp` if the record's timestamp is not in
    /// the device format.
    pub fn from_record(record: &AttendanceRecord) -> punchgate_core::Result<Self> {
        let timestamp = DeviceTimestamp::parse(&record.timestamp)?;
        Ok(Self {
            punch_code: record.punch_code.clone(),
            employee_name: record.employee_name.clone(),
            time: timestamp.to_upstream(),
            device_id: record.device_id.clone(),
        })
    }
}

/// A single upstream delivery attempt.
pub trait UpstreamClient: Send + Sync {
    fn send(
        &self,
        payload: &CheckinPayload,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the HR system
    pub base_url: String,
    /// Checkin endpoint path, joined to `base_url`
    pub api_path: String,
    /// Timeout applied to each call
    pub request_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            api_path: DEFAULT_UPSTREAM_API_PATH.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl UpstreamConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn api_path(mut self, path: impl Into<String>) -> Self {
        self.api_path = path.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Full endpoint URL with exactly one slash between base and path.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.api_path.trim_start_matches('/')
        )
    }
}

/// [`UpstreamClient`] posting form data with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpUpstreamClient {
    client: reqwest::Client,
    endpoint: String,
    request_timeout: Duration,
}

impl HttpUpstreamClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self {
            endpoint: config.endpoint(),
            request_timeout: config.request_timeout,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl UpstreamClient for HttpUpstreamClient {
    async fn send(&self, payload: &CheckinPayload) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.request_timeout)
            .form(payload)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK {
            tracing::debug!(
                punch_code = %payload.punch_code,
                device_id = %payload.device_id,
                "Checkin accepted upstream"
            );
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(TransportError::status(status.as_u16(), &body))
    }
}
