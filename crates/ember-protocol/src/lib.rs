//! # ember-protocol
//!
//! Wire protocol definitions for the Ember realtime channel.
//!
//! Every frame is a UTF-8 JSON envelope of the form
//! `{"event": "<name>", "data": <payload>}`.
//!
//! ## Event Types
//!
//! - `register-user` - Bind a connection to a logical user
//! - `call-user` / `answer-call` / `ice-candidate` - Call signaling
//! - `new-message` / `message-read` / `new-like` / `friend-request-accepted` -
//!   Notifications pushed after REST actions
//!
//! ## Example
//!
//! ```rust
//! use ember_protocol::{codec, ClientEvent, ServerEvent, UserId};
//!
//! let event = codec::decode(r#"{"event":"register-user","data":"alice"}"#).unwrap();
//! assert!(matches!(event, ClientEvent::RegisterUser(Some(_))));
//!
//! let push = ServerEvent::NewMessage {
//!     from: UserId::new("alice"),
//!     message: "hi".to_string(),
//! };
//! let text = codec::encode(&push).unwrap();
//! assert!(text.starts_with(r#"{"event":"new-message""#));
//! ```

pub mod codec;
pub mod events;

pub use codec::{decode, encode, EventCodec, ProtocolError};
pub use events::{AnswerCall, Blob, CallUser, ClientEvent, IceCandidate, ServerEvent, UserId};
