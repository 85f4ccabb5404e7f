//! Transport abstraction traits for Ember.
//!
//! The relay only ever needs to push one encoded event at a live connection,
//! so that is the whole seam.

use ember_protocol::ServerEvent;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Disambiguates handles generated within the same nanosecond.
static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let counter = HANDLE_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{:x}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No live connection has this handle.
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// The connection's writer has gone away.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ember_protocol::ProtocolError),
}

/// Outbound side of the realtime channel.
///
/// Implementations must not block: a send either lands on the connection's
/// outbound queue immediately or fails immediately.
pub trait EventSink: Send + Sync {
    /// Send one event to one live connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is unknown, closed, or the event
    /// cannot be encoded.
    fn send_event(&self, connection: &ConnectionId, event: &ServerEvent) -> Result<(), TransportError>;
}
