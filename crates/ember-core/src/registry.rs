//! Connection registry.
//!
//! Maps a logical user to the single connection it is currently reachable
//! on. The last registration for a user wins.

use dashmap::DashMap;
use ember_protocol::UserId;
use ember_transport::ConnectionId;
use tracing::debug;

/// In-memory map of online users to their live connection.
///
/// Backed by a sharded concurrent map: `register`, `lookup` and
/// `unregister_by_handle` are each atomic per entry, so a disconnect of an
/// old handle can never remove a newer registration for the same user.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: DashMap<UserId, ConnectionId>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `user` with `handle`, replacing any prior association.
    ///
    /// Returns the handle that was replaced, if any.
    pub fn register(&self, user: UserId, handle: ConnectionId) -> Option<ConnectionId> {
        debug!(user = %user, connection = %handle, "Registering user");
        let previous = self.entries.insert(user, handle);
        if let Some(ref old) = previous {
            debug!(connection = %old, "Replaced previous connection");
        }
        previous
    }

    /// Get the live connection for a user.
    #[must_use]
    pub fn lookup(&self, user: &UserId) -> Option<ConnectionId> {
        self.entries.get(user).map(|entry| entry.value().clone())
    }

    /// Remove every entry pointing at `handle`.
    ///
    /// Returns the users that went offline. Unknown handles are a no-op.
    pub fn unregister_by_handle(&self, handle: &ConnectionId) -> Vec<UserId> {
        let mut removed = Vec::new();
        self.entries.retain(|user, current| {
            if current == handle {
                removed.push(user.clone());
                false
            } else {
                true
            }
        });

        for user in &removed {
            debug!(user = %user, connection = %handle, "Unregistered user");
        }
        removed
    }

    /// Check if a user has a live connection.
    #[must_use]
    pub fn is_online(&self, user: &UserId) -> bool {
        self.entries.contains_key(user)
    }

    /// Number of online users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nobody is online.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            online_users: self.entries.len(),
        }
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of users with a live connection.
    pub online_users: usize,
}
