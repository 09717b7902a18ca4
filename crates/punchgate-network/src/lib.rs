//! Device-facing network layer for the punchgate gateway.
//!
//! Terminals hold a WebSocket connection open to the gateway and exchange one
//! JSON object per message. This crate owns that side of the system:
//!
//! - [`SessionRegistry`]: live connections, the connection cap, and the
//!   serial number each device registered with.
//! - [`CommandRouter`]: decodes a message and dispatches it to registration,
//!   attendance delivery or enrollment handling.
//! - [`GatewayServer`]: the accept loop and the per-connection read loops.
//!
//! # Example
//!
//! ```no_run
//! use punchgate_delivery::{HttpUpstreamClient, RetryController, RetryPolicy, UpstreamConfig};
//! use punchgate_network::{CommandRouter, GatewayServer, ServerConfig, SessionRegistry};
//! use punchgate_storage::{Database, DatabaseConfig, SqliteFailureStore};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::open(DatabaseConfig::default()).await?;
//! let store = SqliteFailureStore::new(db.pool().clone());
//! let upstream = HttpUpstreamClient::new(UpstreamConfig::default())?;
//! let delivery = Arc::new(RetryController::new(store, upstream, RetryPolicy::default()));
//!
//! let registry = Arc::new(SessionRegistry::new(50));
//! let router = CommandRouter::new(registry, delivery);
//!
//! let server = GatewayServer::bind(ServerConfig::default(), router).await?;
//! server.serve(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod registry;
pub mod router;
pub mod server;

pub use registry::{
    AdmissionError, RegistrationError, SessionId, SessionInfo, SessionLease, SessionRegistry,
};
pub use router::CommandRouter;
pub use server::{GatewayServer, ServerConfig, ServerError};
