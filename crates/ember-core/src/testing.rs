//! Test doubles shared by the core's unit tests.

use ember_protocol::ServerEvent;
use ember_transport::{ConnectionId, EventSink, TransportError};
use std::sync::Mutex;

/// Sink that records every event it is handed.
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    sent: Mutex<Vec<(ConnectionId, String)>>,
    broken: bool,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A sink whose every send fails as if the socket had just died.
    pub(crate) fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    /// Recorded sends as `(connection, parsed frame)`.
    pub(crate) fn sent(&self) -> Vec<(ConnectionId, serde_json::Value)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(conn, text)| (conn.clone(), serde_json::from_str(text).unwrap()))
            .collect()
    }

    /// Raw encoded frames sent to one connection.
    pub(crate) fn frames_for(&self, connection: &ConnectionId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(conn, _)| conn == connection)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub(crate) fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl EventSink for RecordingSink {
    fn send_event(&self, connection: &ConnectionId, event: &ServerEvent) -> Result<(), TransportError> {
        if self.broken {
            return Err(TransportError::ConnectionClosed);
        }
        let text = ember_protocol::encode(event)?;
        self.sent.lock().unwrap().push((connection.clone(), text));
        Ok(())
    }
}
