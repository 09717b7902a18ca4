//! YAML configuration for the `punchgate` binary.
//!
//! Every section and every key is optional; a missing file section falls back
//! to the same defaults the library crates use.

use punchgate_core::constants::{
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_MESSAGE_SIZE,
    DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_PING_INTERVAL_SECS, DEFAULT_PING_TIMEOUT_SECS,
    DEFAULT_PORT, DEFAULT_RECONCILE_BATCH_SIZE, DEFAULT_RECONCILE_IDLE_SECS,
    DEFAULT_RECONCILE_PASS_SECS, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RETRY_BACKOFF_BASE,
    DEFAULT_UPSTREAM_API_PATH, DEFAULT_UPSTREAM_BASE_URL,
};
use punchgate_delivery::{ReconcilerConfig, RetryPolicy, UpstreamConfig};
use punchgate_network::ServerConfig;
use punchgate_storage::{DEFAULT_DATABASE_PATH, DatabaseConfig};
use serde::Deserialize;
use std::fs::File;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    Load(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] punchgate_core::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    pub idle_timeout_secs: u64,
    pub ping_interval_secs: u64,
    pub ping_timeout_secs: u64,
    pub max_message_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            ping_interval_secs: DEFAULT_PING_INTERVAL_SECS,
            ping_timeout_secs: DEFAULT_PING_TIMEOUT_SECS,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamSection {
    pub base_url: String,
    pub api_path: String,
    pub request_timeout_secs: u64,
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            api_path: DEFAULT_UPSTREAM_API_PATH.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    /// Immediate attempts per record, and the retry count at which
    /// reconciliation gives up on a queued request
    pub max_attempts: u32,
    pub backoff_base: u32,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            backoff_base: DEFAULT_RETRY_BACKOFF_BASE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcilerSection {
    pub batch_size: u32,
    pub idle_interval_secs: u64,
    pub pass_interval_secs: u64,
}

impl Default for ReconcilerSection {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_RECONCILE_BATCH_SIZE,
            idle_interval_secs: DEFAULT_RECONCILE_IDLE_SECS,
            pass_interval_secs: DEFAULT_RECONCILE_PASS_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub database_path: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub listener: ListenerConfig,
    pub upstream: UpstreamSection,
    pub retry: RetrySection,
    pub reconciler: ReconcilerSection,
    pub storage: StorageSection,
}

impl GatewayConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Self = serde_yaml::from_reader(file)?;
        config.validate()?;

        Ok(config)
    }

    /// Load `path` if given, otherwise use defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> punchgate_core::Result<()> {
        self.bind_addr()?;

        if self.listener.max_connections == 0 {
            return Err(invalid("listener.max_connections must be at least 1"));
        }
        if self.listener.idle_timeout_secs == 0 {
            return Err(invalid("listener.idle_timeout_secs must be at least 1"));
        }
        if self.listener.ping_interval_secs == 0 {
            return Err(invalid("listener.ping_interval_secs must be at least 1"));
        }
        if self.listener.ping_timeout_secs == 0 {
            return Err(invalid("listener.ping_timeout_secs must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        if self.retry.backoff_base == 0 {
            return Err(invalid("retry.backoff_base must be at least 1"));
        }
        if self.reconciler.batch_size == 0 {
            return Err(invalid("reconciler.batch_size must be at least 1"));
        }
        if self.storage.database_path.trim().is_empty() {
            return Err(invalid("storage.database_path is empty"));
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> punchgate_core::Result<SocketAddr> {
        let ip: IpAddr = self.listener.host.parse().map_err(|_| {
            invalid(format!(
                "listener.host '{}' is not an IP address",
                self.listener.host
            ))
        })?;

        Ok(SocketAddr::new(ip, self.listener.port))
    }

    pub fn server_config(&self) -> punchgate_core::Result<ServerConfig> {
        Ok(ServerConfig {
            bind_addr: self.bind_addr()?,
            idle_timeout: Duration::from_secs(self.listener.idle_timeout_secs),
            ping_interval: Duration::from_secs(self.listener.ping_interval_secs),
            ping_timeout: Duration::from_secs(self.listener.ping_timeout_secs),
            max_message_size: self.listener.max_message_size,
        })
    }

    pub fn upstream_config(&self) -> UpstreamConfig {
        UpstreamConfig::new(self.upstream.base_url.clone())
            .api_path(self.upstream.api_path.clone())
            .request_timeout(Duration::from_secs(self.upstream.request_timeout_secs))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            backoff_base: self.retry.backoff_base,
            ..Default::default()
        }
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            batch_size: self.reconciler.batch_size,
            max_retry_count: self.retry.max_attempts,
            idle_interval: Duration::from_secs(self.reconciler.idle_interval_secs),
            pass_interval: Duration::from_secs(self.reconciler.pass_interval_secs),
        }
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.storage.database_path.clone())
    }
}

fn invalid(message: impl Into<String>) -> punchgate_core::Error {
    punchgate_core::Error::Config(message.into())
}
