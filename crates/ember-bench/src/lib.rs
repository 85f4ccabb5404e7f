//! Shared fixtures for the Ember benchmarks.

use ember_core::{Realtime, Session};
use ember_protocol::{Blob, ClientEvent, ServerEvent, UserId};
use ember_transport::hub::Outbound;
use ember_transport::{ConnectionHub, ConnectionId, EventSink, TransportError};
use serde_json::value::RawValue;
use std::sync::Arc;

/// Sink that accepts and discards every event.
///
/// Isolates registry and relay cost from encoding and queueing.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn send_event(&self, _connection: &ConnectionId, _event: &ServerEvent) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Name of the `n`th synthetic user.
#[must_use]
pub fn user(n: usize) -> UserId {
    UserId::new(format!("user-{}", n))
}

/// A realtime core over a real hub with registered users.
pub struct Fixture {
    pub realtime: Realtime,
    pub hub: Arc<ConnectionHub>,
    pub sessions: Vec<Session>,
    pub outbound: Vec<Outbound>,
}

impl Fixture {
    /// Register `users` users, each on its own connection.
    #[must_use]
    pub fn new(users: usize) -> Self {
        let hub = Arc::new(ConnectionHub::new());
        let realtime = Realtime::new(hub.clone());
        let mut sessions = Vec::with_capacity(users);
        let mut outbound = Vec::with_capacity(users);

        for n in 0..users {
            let (handle, queue) = hub.attach();
            let mut session = realtime.connect(handle);
            realtime.handle_event(&mut session, ClientEvent::RegisterUser(Some(user(n))));
            sessions.push(session);
            outbound.push(queue);
        }

        Self {
            realtime,
            hub,
            sessions,
            outbound,
        }
    }

    /// Discard everything queued so far. Returns how many frames were dropped.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        for queue in &mut self.outbound {
            while queue.try_recv().is_ok() {
                drained += 1;
            }
        }
        drained
    }
}

/// An SDP-like opaque blob with `len` bytes of session description.
#[must_use]
pub fn sdp_blob(len: usize) -> Blob {
    let json = format!(r#"{{"type":"offer","sdp":"{}"}}"#, "a".repeat(len));
    RawValue::from_string(json).expect("generated blob is valid JSON")
}
