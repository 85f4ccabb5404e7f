//! Best-effort event delivery to a logical user.

use ember_protocol::{ServerEvent, UserId};
use ember_transport::{ConnectionId, EventSink, TransportError};
use std::fmt;
use std::sync::Arc;
use tracing::{trace, warn};

use crate::registry::ConnectionRegistry;

/// Result of one delivery attempt.
///
/// `Offline` and `Failed` look the same to the recipient; neither is an
/// error for the caller.
#[derive(Debug)]
pub enum Delivery {
    /// Queued on the user's live connection.
    Sent(ConnectionId),
    /// The user has no live connection.
    Offline,
    /// The send failed; already logged.
    Failed(TransportError),
}

impl Delivery {
    /// Check if the event reached a connection.
    #[must_use]
    pub fn is_sent(&self) -> bool {
        matches!(self, Delivery::Sent(_))
    }

    /// Short label for metrics.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Delivery::Sent(_) => "sent",
            Delivery::Offline => "offline",
            Delivery::Failed(_) => "failed",
        }
    }
}

/// Looks up a user's connection and pushes one event at it.
///
/// No queueing, no retry: the durable store is the source of truth and an
/// undelivered event is simply not delivered.
pub struct EventRelay {
    registry: Arc<ConnectionRegistry>,
    sink: Arc<dyn EventSink>,
}

impl EventRelay {
    /// Create a relay over a shared registry and an outbound sink.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, sink: Arc<dyn EventSink>) -> Self {
        Self { registry, sink }
    }

    /// Get the live connection for a user.
    #[must_use]
    pub fn find_live_connection(&self, user: &UserId) -> Option<ConnectionId> {
        self.registry.lookup(user)
    }

    /// Deliver `event` to `target` if they are online.
    pub fn deliver(&self, target: &UserId, event: &ServerEvent) -> Delivery {
        let Some(connection) = self.find_live_connection(target) else {
            trace!(user = %target, event = event.name(), "Target offline, dropping event");
            return Delivery::Offline;
        };

        match self.sink.send_event(&connection, event) {
            Ok(()) => {
                trace!(user = %target, connection = %connection, event = event.name(), "Delivered event");
                Delivery::Sent(connection)
            }
            Err(e) => {
                warn!(
                    user = %target,
                    connection = %connection,
                    event = event.name(),
                    error = %e,
                    "Relay send failed"
                );
                Delivery::Failed(e)
            }
        }
    }
}

impl fmt::Debug for EventRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRelay")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
