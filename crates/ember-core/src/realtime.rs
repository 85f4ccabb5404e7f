//! The realtime facade.
//!
//! Builds the registry once and hands the same instance to the lifecycle,
//! relay, signaling and bridge. The channel layer talks to [`Realtime`] and
//! nothing else.

use ember_protocol::{ClientEvent, UserId};
use ember_transport::{ConnectionId, EventSink};
use std::sync::Arc;

use crate::bridge::NotificationBridge;
use crate::lifecycle::{PresenceLifecycle, Registration, Session};
use crate::registry::{ConnectionRegistry, RegistryStats};
use crate::relay::{Delivery, EventRelay};
use crate::signaling::SignalingHandler;

/// What handling one client event did.
#[derive(Debug)]
pub enum Handled {
    /// A `register-user` event.
    Registration(Registration),
    /// A signaling event relayed to its peer.
    Relayed(Delivery),
}

/// Presence registry plus everything that reads or writes it.
#[derive(Debug, Clone)]
pub struct Realtime {
    registry: Arc<ConnectionRegistry>,
    lifecycle: PresenceLifecycle,
    signaling: SignalingHandler,
    bridge: NotificationBridge,
}

impl Realtime {
    /// Wire up a fresh registry behind `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self::with_registry(Arc::new(ConnectionRegistry::new()), sink)
    }

    /// Wire up around an existing registry.
    #[must_use]
    pub fn with_registry(registry: Arc<ConnectionRegistry>, sink: Arc<dyn EventSink>) -> Self {
        let relay = Arc::new(EventRelay::new(Arc::clone(&registry), sink));
        Self {
            lifecycle: PresenceLifecycle::new(Arc::clone(&registry)),
            signaling: SignalingHandler::new(Arc::clone(&relay)),
            bridge: NotificationBridge::new(relay),
            registry,
        }
    }

    /// The bridge REST handlers notify through.
    #[must_use]
    pub fn bridge(&self) -> &NotificationBridge {
        &self.bridge
    }

    /// Check if a user currently has a live connection.
    #[must_use]
    pub fn is_online(&self, user: &UserId) -> bool {
        self.registry.is_online(user)
    }

    /// Registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    /// A channel was opened.
    #[must_use]
    pub fn connect(&self, handle: ConnectionId) -> Session {
        self.lifecycle.connect(handle)
    }

    /// Dispatch one decoded client event arriving on `session`.
    pub fn handle_event(&self, session: &mut Session, event: ClientEvent) -> Handled {
        session.touch();
        match event {
            ClientEvent::RegisterUser(user) => {
                Handled::Registration(self.lifecycle.register(session, user))
            }
            ClientEvent::CallUser(call) => Handled::Relayed(self.signaling.call_user(call)),
            ClientEvent::AnswerCall(answer) => {
                Handled::Relayed(self.signaling.answer_call(answer))
            }
            ClientEvent::IceCandidate(candidate) => {
                Handled::Relayed(self.signaling.ice_candidate(candidate))
            }
        }
    }

    /// The channel closed or errored. Returns the users that went offline.
    pub fn disconnect(&self, session: &mut Session) -> Vec<UserId> {
        self.lifecycle.disconnect(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Action;
    use crate::testing::RecordingSink;
    use ember_protocol::codec;

    fn realtime() -> (Realtime, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        (Realtime::new(sink.clone()), sink)
    }

    fn frame(realtime: &Realtime, session: &mut Session, text: &str) -> Handled {
        realtime.handle_event(session, codec::decode(text).unwrap())
    }

    #[test]
    fn test_message_scenario() {
        let (realtime, sink) = realtime();
        let mut alice = realtime.connect(ConnectionId::new("h1"));
        let mut bob = realtime.connect(ConnectionId::new("h2"));

        frame(&realtime, &mut alice, r#"{"event":"register-user","data":"A"}"#);
        frame(&realtime, &mut bob, r#"{"event":"register-user","data":"B"}"#);
        assert_eq!(realtime.stats().online_users, 2);

        let hi = Action::MessageSent {
            from: UserId::new("A"),
            to: UserId::new("B"),
            message: "hi".to_string(),
        };
        realtime.bridge().notify(&hi);

        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ConnectionId::new("h2"));
        assert_eq!(sent[0].1["event"], "new-message");
        assert_eq!(sent[0].1["data"], serde_json::json!({"from": "A", "message": "hi"}));

        assert_eq!(realtime.disconnect(&mut bob), vec![UserId::new("B")]);
        assert!(!realtime.is_online(&UserId::new("B")));

        let outcomes = realtime.bridge().notify(&hi);
        assert!(matches!(outcomes.as_slice(), [Delivery::Offline]));
        assert_eq!(sink.count(), 1);
    }

    #[test]
    fn test_call_flow_between_peers() {
        let (realtime, sink) = realtime();
        let mut alice = realtime.connect(ConnectionId::new("h1"));
        let mut bob = realtime.connect(ConnectionId::new("h2"));
        frame(&realtime, &mut alice, r#"{"event":"register-user","data":"A"}"#);
        frame(&realtime, &mut bob, r#"{"event":"register-user","data":"B"}"#);

        let offered = frame(
            &realtime,
            &mut alice,
            r#"{"event":"call-user","data":{"to":"B","offer":{"sdp":"o"},"from":"A"}}"#,
        );
        assert!(matches!(offered, Handled::Relayed(Delivery::Sent(_))));

        frame(
            &realtime,
            &mut bob,
            r#"{"event":"answer-call","data":{"to":"A","answer":{"sdp":"a"}}}"#,
        );

        assert_eq!(
            sink.frames_for(&ConnectionId::new("h2")),
            vec![r#"{"event":"incoming-call","data":{"from":"A","offer":{"sdp":"o"}}}"#]
        );
        assert_eq!(
            sink.frames_for(&ConnectionId::new("h1")),
            vec![r#"{"event":"call-answered","data":{"answer":{"sdp":"a"}}}"#]
        );
    }

    #[test]
    fn test_empty_registration_is_ignored() {
        let (realtime, sink) = realtime();
        let mut session = realtime.connect(ConnectionId::new("h1"));

        let handled = frame(&realtime, &mut session, r#"{"event":"register-user","data":""}"#);
        assert!(matches!(handled, Handled::Registration(Registration::Ignored)));
        assert_eq!(realtime.stats().online_users, 0);
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_instances_are_isolated() {
        let (first, _) = realtime();
        let (second, _) = realtime();

        let mut session = first.connect(ConnectionId::new("h1"));
        first.handle_event(&mut session, ClientEvent::RegisterUser(Some(UserId::new("A"))));

        assert!(first.is_online(&UserId::new("A")));
        assert!(!second.is_online(&UserId::new("A")));
    }
}
