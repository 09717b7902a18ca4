//! Live device sessions.
//!
//! Every accepted connection is admitted into the [`SessionRegistry`] before
//! its handshake and removed when its read loop ends. A session starts
//! unregistered and gains a [`SerialNumber`] on a successful `reg` command.
//! Unregistered sessions count toward the connection cap but are invisible
//! to serial lookups.
//!
//! The registry lock is a plain `std::sync::RwLock`; it is never held across
//! an await point.
//!
//! # Example
//!
//! ```
//! use punchgate_network::SessionRegistry;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(SessionRegistry::new(50));
//! let lease = SessionRegistry::lease(&registry, "10.0.0.7:40112".parse().unwrap()).unwrap();
//!
//! registry.register(lease.id(), "ZX0006827500").unwrap();
//! assert_eq!(registry.lookup("ZX0006827500"), Some(lease.id()));
//!
//! drop(lease);
//! assert!(registry.is_empty());
//! ```

use chrono::{DateTime, Utc};
use punchgate_core::SerialNumber;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Opaque handle of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Admission failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Maximum connections reached: {0}")]
    CapacityExceeded(usize),
}

/// Registration failures. None of them change the registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Missing serial number")]
    MissingIdentity,

    /// The session already holds a different serial
    #[error("Session already registered as {0}")]
    AlreadyRegistered(SerialNumber),

    #[error("Session {0} not connected")]
    UnknownSession(SessionId),
}

#[derive(Debug, Clone)]
struct DeviceSession {
    serial: Option<SerialNumber>,
    remote_addr: SocketAddr,
    connected_at: DateTime<Utc>,
    registered_at: Option<DateTime<Utc>>,
}

/// Session snapshot for monitoring.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: SessionId,
    pub serial: Option<SerialNumber>,
    pub remote_addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
    pub registered_at: Option<DateTime<Utc>>,
    pub uptime: chrono::Duration,
}

#[derive(Debug, Default)]
struct Sessions {
    sessions: HashMap<SessionId, DeviceSession>,
    by_serial: HashMap<SerialNumber, SessionId>,
}

#[derive(Debug)]
pub struct SessionRegistry {
    max_sessions: usize,
    next_id: AtomicU64,
    inner: RwLock<Sessions>,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            max_sessions,
            next_id: AtomicU64::new(1),
            inner: RwLock::new(Sessions::default()),
        }
    }

    // A panic elsewhere never leaves the maps half-updated, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, Sessions> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Sessions> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an unregistered session for a new connection.
    ///
    /// # Errors
    /// Returns `AdmissionError::CapacityExceeded` when `max_sessions` sessions
    /// are already live.
    pub fn admit(&self, remote_addr: SocketAddr) -> Result<SessionId, AdmissionError> {
        let mut inner = self.write();
        if inner.sessions.len() >= self.max_sessions {
            return Err(AdmissionError::CapacityExceeded(self.max_sessions));
        }

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        inner.sessions.insert(
            id,
            DeviceSession {
                serial: None,
                remote_addr,
                connected_at: Utc::now(),
                registered_at: None,
            },
        );
        Ok(id)
    }

    /// Admit a connection and wrap it in a lease that removes it on drop.
    pub fn lease(
        registry: &Arc<SessionRegistry>,
        remote_addr: SocketAddr,
    ) -> Result<SessionLease, AdmissionError> {
        let id = registry.admit(remote_addr)?;
        Ok(SessionLease {
            registry: Arc::clone(registry),
            id,
        })
    }

    /// Attach a serial number to a session.
    ///
    /// Registering the serial a session already holds is a no-op. If another
    /// live session holds the serial, that session loses it: a device that
    /// reconnects without closing its old socket keeps working.
    pub fn register(&self, id: SessionId, serial: &str) -> Result<(), RegistrationError> {
        let serial = SerialNumber::new(serial).map_err(|_| RegistrationError::MissingIdentity)?;

        let mut guard = self.write();
        let inner = &mut *guard;
        let session = inner
            .sessions
            .get_mut(&id)
            .ok_or(RegistrationError::UnknownSession(id))?;

        match &session.serial {
            Some(current) if *current == serial => return Ok(()),
            Some(current) => return Err(RegistrationError::AlreadyRegistered(current.clone())),
            None => {}
        }

        session.serial = Some(serial.clone());
        session.registered_at = Some(Utc::now());

        if let Some(previous) = inner.by_serial.insert(serial.clone(), id)
            && previous != id
            && let Some(stale) = inner.sessions.get_mut(&previous)
        {
            stale.serial = None;
            stale.registered_at = None;
            tracing::warn!(
                serial = %serial,
                session = %id,
                replaced = %previous,
                "Serial number re-registered, previous session unbound"
            );
        }

        Ok(())
    }

    /// The live session currently bound to `serial`.
    pub fn lookup(&self, serial: &str) -> Option<SessionId> {
        let serial = SerialNumber::new(serial).ok()?;
        self.read().by_serial.get(&serial).copied()
    }

    pub fn serial_of(&self, id: SessionId) -> Option<SerialNumber> {
        self.read().sessions.get(&id)?.serial.clone()
    }

    /// Remove a session. Returns `false` if it was already gone.
    pub fn remove(&self, id: SessionId) -> bool {
        let mut inner = self.write();
        let Some(session) = inner.sessions.remove(&id) else {
            return false;
        };

        if let Some(serial) = session.serial
            && inner.by_serial.get(&serial) == Some(&id)
        {
            inner.by_serial.remove(&serial);
        }
        true
    }

    /// Live sessions, registered or not.
    pub fn len(&self) -> usize {
        self.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn registered_count(&self) -> usize {
        self.read().by_serial.len()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Snapshot of every live session, ordered by id.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let now = Utc::now();
        let mut sessions: Vec<SessionInfo> = self
            .read()
            .sessions
            .iter()
            .map(|(id, s)| SessionInfo {
                id: *id,
                serial: s.serial.clone(),
                remote_addr: s.remote_addr,
                connected_at: s.connected_at,
                registered_at: s.registered_at,
                uptime: now - s.connected_at,
            })
            .collect();
        sessions.sort_by_key(|s| s.id);
        sessions
    }
}

/// Ownership of one admitted session. Dropping it removes the session.
#[derive(Debug)]
pub struct SessionLease {
    registry: Arc<SessionRegistry>,
    id: SessionId,
}

impl SessionLease {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
