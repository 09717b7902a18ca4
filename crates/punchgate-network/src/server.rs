//! WebSocket acceptor for device connections.
//!
//! # Architecture
//!
//! ```text
//! Device ZX01 ┐                                   ┌──> SessionRegistry
//!             │                                   │
//! Device ZX02 ├──> GatewayServer ──> task/conn ───┼──> CommandRouter ──> RetryController
//!             │    (admission)       (read loop)  │
//! Device ZX50 ┘                                   └──> JSON response
//! ```
//!
//! Admission happens right after the TCP accept, before the WebSocket
//! handshake. A connection over the cap never gets a session: it completes
//! the handshake, receives a `"Server connection limit reached"` error and is
//! closed.
//!
//! Each admitted connection gets its own task. The task reads one message,
//! hands it to the router, writes the reply, and repeats until the device
//! closes, the connection sits idle past `idle_timeout`, a keepalive ping goes
//! unanswered, a write fails, or the server shuts down. The session's
//! [`SessionLease`] is dropped when the task ends, which removes it from the
//! registry exactly once.

use crate::registry::{SessionLease, SessionRegistry};
use crate::router::CommandRouter;
use futures::{SinkExt, StreamExt};
use punchgate_core::constants::{
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PING_INTERVAL_SECS,
    DEFAULT_PING_TIMEOUT_SECS, DEFAULT_PORT,
};
use punchgate_delivery::UpstreamClient;
use punchgate_protocol::Response;
use punchgate_storage::FailureStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Listener settings.
///
/// The connection cap is not here: it belongs to the [`SessionRegistry`]
/// shared with the router.
///
/// # Example
///
/// ```
/// use punchgate_network::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig {
///     bind_addr: "127.0.0.1:8190".parse().unwrap(),
///     idle_timeout: Duration::from_secs(60),
///     ..Default::default()
/// };
/// assert_eq!(config.max_message_size, 1024 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listener to
    pub bind_addr: SocketAddr,

    /// Close a session after this long without an inbound message
    pub idle_timeout: Duration,

    /// Send a keepalive ping this often
    pub ping_interval: Duration,

    /// Drop the session if a ping goes unanswered this long
    pub ping_timeout: Duration,

    /// Largest accepted WebSocket message, in bytes
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            ping_interval: Duration::from_secs(DEFAULT_PING_INTERVAL_SECS),
            ping_timeout: Duration::from_secs(DEFAULT_PING_TIMEOUT_SECS),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ServerConfig {
    fn websocket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_message_size);
        config
    }

    /// Finish the WebSocket handshake, giving up on shutdown or after
    /// `idle_timeout`.
    async fn handshake(
        &self,
        stream: TcpStream,
        shutdown: &CancellationToken,
    ) -> Option<WebSocketStream<TcpStream>> {
        let handshake =
            tokio_tungstenite::accept_async_with_config(stream, Some(self.websocket_config()));

        let result = tokio::select! {
            _ = shutdown.cancelled() => return None,
            result = tokio::time::timeout(self.idle_timeout, handshake) => result,
        };

        match result {
            Ok(Ok(websocket)) => Some(websocket),
            Ok(Err(e)) => {
                warn!(error = %e, "WebSocket handshake failed");
                None
            }
            Err(_) => {
                warn!("WebSocket handshake timed out");
                None
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address
    #[error("Failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Low-level I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Device gateway listener.
pub struct GatewayServer<S, U> {
    listener: TcpListener,
    config: ServerConfig,
    router: CommandRouter<S, U>,
}

impl<S, U> GatewayServer<S, U>
where
    S: FailureStore + 'static,
    U: UpstreamClient + 'static,
{
    /// Bind the listener. Connections are not accepted until [`serve`](Self::serve).
    pub async fn bind(config: ServerConfig, router: CommandRouter<S, U>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| ServerError::BindFailed {
                addr: config.bind_addr,
                source,
            })?;

        info!(
            addr = %listener.local_addr()?,
            max_connections = router.registry().max_sessions(),
            idle_timeout_secs = config.idle_timeout.as_secs(),
            "Device gateway listening"
        );

        Ok(Self {
            listener,
            config,
            router,
        })
    }

    /// Actual bound address, useful when binding to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.router.registry()
    }

    /// Accept connections until `shutdown` is cancelled, then wait for every
    /// connection task to finish.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        let registry = Arc::clone(self.router.registry());
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                accepted = self.listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };

                    let lease = match SessionRegistry::lease(&registry, addr) {
                        Ok(lease) => lease,
                        Err(e) => {
                            error!(
                                addr = %addr,
                                max_connections = registry.max_sessions(),
                                current_connections = registry.len(),
                                error = %e,
                                "Connection rejected: maximum connections reached"
                            );
                            connections.spawn(refuse_connection(
                                stream,
                                addr,
                                self.config.clone(),
                                shutdown.clone(),
                            ));
                            continue;
                        }
                    };

                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(addr = %addr, error = %e, "Failed to set TCP_NODELAY");
                    }

                    info!(
                        session = %lease.id(),
                        addr = %addr,
                        total = registry.len(),
                        "Device connected"
                    );

                    connections.spawn(serve_connection(
                        stream,
                        lease,
                        self.router.clone(),
                        self.config.clone(),
                        shutdown.clone(),
                    ));
                }

                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Connection task failed");
                    }
                }
            }
        }

        info!(open_connections = connections.len(), "Gateway shutting down");
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Connection task failed");
            }
        }
        info!("Gateway stopped");

        Ok(())
    }
}

/// Tell a device over the cap why it is being turned away, then close.
/// No session is created, so the registry is untouched.
async fn refuse_connection(
    stream: TcpStream,
    addr: SocketAddr,
    config: ServerConfig,
    shutdown: CancellationToken,
) {
    let Some(mut websocket) = config.handshake(stream, &shutdown).await else {
        return;
    };

    match Response::connection_limit_reached().encode() {
        Ok(encoded) => {
            if let Err(e) = websocket.send(Message::Text(encoded)).await {
                debug!(addr = %addr, error = %e, "Could not deliver refusal");
            }
        }
        Err(e) => error!(addr = %addr, error = %e, "Failed to encode refusal"),
    }

    if let Err(e) = websocket.close(None).await {
        debug!(addr = %addr, error = %e, "Close handshake incomplete");
    }
}

async fn serve_connection<S, U>(
    stream: TcpStream,
    lease: SessionLease,
    router: CommandRouter<S, U>,
    config: ServerConfig,
    shutdown: CancellationToken,
) where
    S: FailureStore,
    U: UpstreamClient,
{
    let session = lease.id();

    let Some(websocket) = config.handshake(stream, &shutdown).await else {
        debug!(session = %session, "Session ended before handshake");
        return;
    };

    let (mut sink, mut source) = websocket.split();

    let mut keepalive = tokio::time::interval_at(
        Instant::now() + config.ping_interval,
        config.ping_interval,
    );
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_activity = Instant::now();
    let mut pong_deadline: Option<Instant> = None;

    loop {
        let idle_deadline = last_activity + config.idle_timeout;

        let next = tokio::select! {
            _ = shutdown.cancelled() => break,

            _ = tokio::time::sleep_until(idle_deadline) => {
                info!(session = %session, "Closing idle session");
                break;
            }

            _ = tokio::time::sleep_until(pong_deadline.unwrap_or(idle_deadline)), if pong_deadline.is_some() => {
                info!(session = %session, "Keepalive ping unanswered, closing session");
                break;
            }

            _ = keepalive.tick() => {
                trace!(session = %session, "Sending keepalive ping");
                if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                    warn!(session = %session, error = %e, "Ping failed, closing session");
                    break;
                }
                if pong_deadline.is_none() {
                    pong_deadline = Some(Instant::now() + config.ping_timeout);
                }
                continue;
            }

            next = source.next() => next,
        };

        let message = match next {
            None => break,
            Some(Err(e)) => {
                warn!(session = %session, error = %e, "WebSocket read failed");
                break;
            }
            Some(Ok(message)) => message,
        };
        last_activity = Instant::now();

        let response = match message {
            Message::Text(text) => router.handle(session, &text).await,
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => router.handle(session, &text).await,
                Err(_) => {
                    warn!(session = %session, "Binary message is not UTF-8");
                    Response::decode_error()
                }
            },
            Message::Close(frame) => {
                debug!(session = %session, frame = ?frame, "Device sent close");
                break;
            }
            Message::Pong(_) => {
                pong_deadline = None;
                continue;
            }
            // Pings are answered by the WebSocket layer.
            _ => continue,
        };

        let encoded = match response.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(session = %session, error = %e, "Failed to encode response");
                continue;
            }
        };

        trace!(session = %session, response = %encoded, "Sending response");
        if let Err(e) = sink.send(Message::Text(encoded)).await {
            warn!(session = %session, error = %e, "Write failed, closing session");
            break;
        }
    }

    if let Err(e) = sink.close().await {
        debug!(session = %session, error = %e, "Close handshake incomplete");
    }

    let serial = router.registry().serial_of(session);
    drop(lease);
    info!(
        session = %session,
        serial = serial.as_ref().map(|s| s.as_str()).unwrap_or("-"),
        "Device disconnected"
    );
}
