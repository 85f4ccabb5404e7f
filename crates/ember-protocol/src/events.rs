//! Event types for the Ember protocol.
//!
//! Client events arrive over the realtime channel and are decoded by the
//! codec. Server events are pushed to a single connected user.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fmt;

/// An opaque signaling blob (SDP offer/answer, ICE candidate).
///
/// Held as raw JSON text so the relay forwards it byte-for-byte.
pub type Blob = Box<RawValue>;

/// Event names as they appear on the wire.
pub mod names {
    pub const REGISTER_USER: &str = "register-user";
    pub const CALL_USER: &str = "call-user";
    pub const ANSWER_CALL: &str = "answer-call";
    pub const ICE_CANDIDATE: &str = "ice-candidate";
    pub const INCOMING_CALL: &str = "incoming-call";
    pub const CALL_ANSWERED: &str = "call-answered";
    pub const NEW_MESSAGE: &str = "new-message";
    pub const MESSAGE_READ: &str = "message-read";
    pub const NEW_LIKE: &str = "new-like";
    pub const FRIEND_REQUEST_ACCEPTED: &str = "friend-request-accepted";
}

/// A logical user identifier.
///
/// Owned by the account store; the relay only compares it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a new user ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the ID is empty or whitespace only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Payload of `call-user`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallUser {
    /// Callee.
    pub to: UserId,
    /// SDP offer, opaque to the server.
    pub offer: Blob,
    /// Caller, as claimed by the client.
    pub from: UserId,
}

/// Payload of `answer-call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerCall {
    /// Original caller.
    pub to: UserId,
    /// SDP answer, opaque to the server.
    pub answer: Blob,
}

/// Payload of client-side `ice-candidate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Peer the candidate is meant for.
    pub to: UserId,
    /// ICE candidate, opaque to the server.
    pub candidate: Blob,
}

/// An event sent by a client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Bind the connection to a user. `None` when the client sent no id.
    RegisterUser(Option<UserId>),
    /// Start a call.
    CallUser(CallUser),
    /// Answer a call.
    AnswerCall(AnswerCall),
    /// Trickle an ICE candidate.
    IceCandidate(IceCandidate),
}

impl ClientEvent {
    /// Get the wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::RegisterUser(_) => names::REGISTER_USER,
            ClientEvent::CallUser(_) => names::CALL_USER,
            ClientEvent::AnswerCall(_) => names::ANSWER_CALL,
            ClientEvent::IceCandidate(_) => names::ICE_CANDIDATE,
        }
    }
}

/// An event pushed by the server to one connected user.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Someone is calling.
    IncomingCall { from: UserId, offer: Blob },
    /// The callee answered.
    CallAnswered { answer: Blob },
    /// ICE candidate from the peer.
    IceCandidate { candidate: Blob },
    /// A message was sent to this user.
    NewMessage { from: UserId, message: String },
    /// `from` has read the messages `to` sent them.
    MessageRead { from: UserId, to: UserId },
    /// Someone liked this user's profile.
    NewLike { from: UserId, message: String },
    /// A like became mutual; `by` is the counterpart.
    FriendRequestAccepted { by: UserId, message: String },
}

impl ServerEvent {
    /// Get the wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::IncomingCall { .. } => names::INCOMING_CALL,
            ServerEvent::CallAnswered { .. } => names::CALL_ANSWERED,
            ServerEvent::IceCandidate { .. } => names::ICE_CANDIDATE,
            ServerEvent::NewMessage { .. } => names::NEW_MESSAGE,
            ServerEvent::MessageRead { .. } => names::MESSAGE_READ,
            ServerEvent::NewLike { .. } => names::NEW_LIKE,
            ServerEvent::FriendRequestAccepted { .. } => names::FRIEND_REQUEST_ACCEPTED,
        }
    }
}
