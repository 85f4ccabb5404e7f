//! Presence lifecycle for realtime connections.
//!
//! Each connection moves through `Connected → Registered → Disconnected`.
//! Registration binds the connection to a user in the shared registry and
//! disconnect purges every binding that still points at it.

use ember_protocol::UserId;
use ember_transport::ConnectionId;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::registry::ConnectionRegistry;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// The channel is open but no user has been bound.
    Connected,
    /// The channel is bound to this user (the most recent registration).
    Registered(UserId),
    /// The channel is gone. Terminal.
    Disconnected,
}

/// Per-connection state, owned by the task driving the socket.
#[derive(Debug)]
pub struct Session {
    handle: ConnectionId,
    state: SessionState,
    connected_at: u64,
    last_seen: u64,
}

impl Session {
    fn new(handle: ConnectionId) -> Self {
        let now = now_millis();
        Self {
            handle,
            state: SessionState::Connected,
            connected_at: now,
            last_seen: now,
        }
    }

    /// Get the connection handle.
    #[must_use]
    pub fn handle(&self) -> &ConnectionId {
        &self.handle
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The user this connection is registered as, if any.
    #[must_use]
    pub fn user(&self) -> Option<&UserId> {
        match &self.state {
            SessionState::Registered(user) => Some(user),
            _ => None,
        }
    }

    /// Check if the session has reached its terminal state.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.state == SessionState::Disconnected
    }

    /// When the channel was opened (ms since epoch).
    #[must_use]
    pub fn connected_at(&self) -> u64 {
        self.connected_at
    }

    /// Record inbound activity.
    pub fn touch(&mut self) {
        self.last_seen = now_millis();
    }

    /// Check if there has been no inbound activity for `timeout`.
    #[must_use]
    pub fn is_stale(&self, timeout: Duration) -> bool {
        now_millis().saturating_sub(self.last_seen) > timeout.as_millis() as u64
    }
}

/// Outcome of a registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The user is now reachable on this connection.
    Registered {
        /// Connection the user was previously reachable on.
        replaced: Option<ConnectionId>,
    },
    /// Missing or blank id, or the session is already closed.
    Ignored,
}

impl Registration {
    /// Check if the attempt changed the registry.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        matches!(self, Registration::Registered { .. })
    }
}

/// Drives registry updates from connection lifecycle events.
#[derive(Debug, Clone)]
pub struct PresenceLifecycle {
    registry: Arc<ConnectionRegistry>,
}

impl PresenceLifecycle {
    /// Create a lifecycle handler over a shared registry.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// A channel was opened.
    #[must_use]
    pub fn connect(&self, handle: ConnectionId) -> Session {
        debug!(connection = %handle, "Connection opened");
        Session::new(handle)
    }

    /// A registration event arrived on `session`.
    ///
    /// Missing or blank ids are ignored without surfacing anything to the
    /// client. Registering again overwrites the registry entry for that user.
    pub fn register(&self, session: &mut Session, user: Option<UserId>) -> Registration {
        if session.is_disconnected() {
            return Registration::Ignored;
        }

        let user = match user {
            Some(user) if !user.is_blank() => user,
            _ => {
                debug!(connection = %session.handle, "Ignoring registration without user id");
                return Registration::Ignored;
            }
        };

        let replaced = self.registry.register(user.clone(), session.handle.clone());
        session.state = SessionState::Registered(user);
        session.touch();
        Registration::Registered { replaced }
    }

    /// The channel closed or errored.
    ///
    /// Returns the users that went offline. Calling this twice is harmless.
    pub fn disconnect(&self, session: &mut Session) -> Vec<UserId> {
        if session.is_disconnected() {
            return Vec::new();
        }

        session.state = SessionState::Disconnected;
        let removed = self.registry.unregister_by_handle(&session.handle);
        debug!(
            connection = %session.handle,
            offline = removed.len(),
            "Connection closed"
        );
        removed
    }
}
