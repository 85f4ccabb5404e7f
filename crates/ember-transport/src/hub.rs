//! Connection hub.
//!
//! Every live socket owns one unbounded queue of encoded frames. The socket's
//! writer drains it in order, so events for one connection are never
//! reordered.

use dashmap::DashMap;
use ember_protocol::{EventCodec, ServerEvent};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::traits::{ConnectionId, EventSink, TransportError};

/// Receiving end of a connection's outbound queue.
pub type Outbound = mpsc::UnboundedReceiver<String>;

/// Table of live connections and their outbound queues.
#[derive(Debug, Default)]
pub struct ConnectionHub {
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<String>>,
    codec: EventCodec,
}

impl ConnectionHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new connection with a generated handle.
    ///
    /// Returns the handle and the queue the socket writer must drain.
    pub fn attach(&self) -> (ConnectionId, Outbound) {
        let id = ConnectionId::generate();
        let rx = self.attach_with_id(id.clone());
        (id, rx)
    }

    /// Attach a connection under a caller-chosen handle.
    ///
    /// Re-attaching an existing handle replaces its queue.
    pub fn attach_with_id(&self, id: ConnectionId) -> Outbound {
        let (tx, rx) = mpsc::unbounded_channel();
        debug!(connection = %id, "Connection attached");
        self.connections.insert(id, tx);
        rx
    }

    /// Detach a connection. Returns `true` if it was attached.
    pub fn detach(&self, id: &ConnectionId) -> bool {
        let removed = self.connections.remove(id).is_some();
        if removed {
            debug!(connection = %id, "Connection detached");
        }
        removed
    }

    /// Check if a handle is attached.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Number of attached connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if no connections are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl EventSink for ConnectionHub {
    fn send_event(&self, connection: &ConnectionId, event: &ServerEvent) -> Result<(), TransportError> {
        let sender = self
            .connections
            .get(connection)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::UnknownConnection(connection.clone()))?;

        let text = self.codec.encode(event)?;
        sender
            .send(text)
            .map_err(|_| TransportError::ConnectionClosed)?;

        trace!(connection = %connection, event = event.name(), "Queued event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_protocol::UserId;

    fn like(from: &str) -> ServerEvent {
        ServerEvent::NewLike {
            from: UserId::new(from),
            message: format!("{} liked your profile.", from),
        }
    }

    #[test]
    fn test_hub_attach_detach() {
        let hub = ConnectionHub::new();
        let (id, _rx) = hub.attach();

        assert!(hub.contains(&id));
        assert_eq!(hub.len(), 1);

        assert!(hub.detach(&id));
        assert!(!hub.detach(&id));
        assert!(hub.is_empty());
    }

    #[test]
    fn test_hub_send_preserves_order() {
        let hub = ConnectionHub::new();
        let (id, mut rx) = hub.attach();

        hub.send_event(&id, &like("alice")).unwrap();
        hub.send_event(&id, &like("bob")).unwrap();

        let first: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        let second: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(first["data"]["from"], "alice");
        assert_eq!(second["data"]["from"], "bob");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_hub_send_unknown_connection() {
        let hub = ConnectionHub::new();
        let missing = ConnectionId::new("conn_missing");

        assert!(matches!(
            hub.send_event(&missing, &like("alice")),
            Err(TransportError::UnknownConnection(id)) if id == missing
        ));
    }

    #[test]
    fn test_hub_send_after_writer_dropped() {
        let hub = ConnectionHub::new();
        let (id, rx) = hub.attach();
        drop(rx);

        assert!(matches!(
            hub.send_event(&id, &like("alice")),
            Err(TransportError::ConnectionClosed)
        ));
    }
}
