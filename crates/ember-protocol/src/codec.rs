//! Codec for encoding and decoding Ember events.
//!
//! Client frames are decoded in two steps: the envelope is parsed first, then
//! the payload is parsed into the typed shape for that event name. Signaling
//! blobs stay raw so they are never re-serialized.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::value::RawValue;
use thiserror::Error;

use crate::events::{names, ClientEvent, ServerEvent, UserId};

/// Maximum frame size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// The envelope names an event this server does not handle.
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    /// The event requires a payload but none was sent.
    #[error("Missing payload for {0}")]
    MissingPayload(&'static str),

    /// The payload does not match the event's shape.
    #[error("Invalid payload for {event}: {source}")]
    InvalidPayload {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The frame is not a JSON envelope.
    #[error("Decoding error: {0}")]
    Decode(#[source] serde_json::Error),

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Deserialize)]
struct Envelope<'a> {
    event: String,
    #[serde(default, borrow)]
    data: Option<&'a RawValue>,
}

/// Encode a server event to a JSON text frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(event: &ServerEvent) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(ProtocolError::Encode)
}

/// Decode a client event from a JSON text frame.
///
/// # Errors
///
/// Returns an error if the frame is too large, not an envelope, names an
/// unknown event, or carries a payload of the wrong shape.
pub fn decode(text: &str) -> Result<ClientEvent, ProtocolError> {
    decode_with_limit(text, MAX_FRAME_SIZE)
}

/// Decode a client event, rejecting frames larger than `max_frame_size`.
///
/// # Errors
///
/// See [`decode`].
pub fn decode_with_limit(text: &str, max_frame_size: usize) -> Result<ClientEvent, ProtocolError> {
    if text.len() > max_frame_size {
        return Err(ProtocolError::FrameTooLarge {
            size: text.len(),
            max: max_frame_size,
        });
    }

    let envelope: Envelope<'_> = serde_json::from_str(text).map_err(ProtocolError::Decode)?;

    match envelope.event.as_str() {
        names::REGISTER_USER => decode_registration(envelope.data).map(ClientEvent::RegisterUser),
        names::CALL_USER => payload(names::CALL_USER, envelope.data).map(ClientEvent::CallUser),
        names::ANSWER_CALL => {
            payload(names::ANSWER_CALL, envelope.data).map(ClientEvent::AnswerCall)
        }
        names::ICE_CANDIDATE => {
            payload(names::ICE_CANDIDATE, envelope.data).map(ClientEvent::IceCandidate)
        }
        _ => Err(ProtocolError::UnknownEvent(envelope.event)),
    }
}

/// A missing or `null` id is not an error here; the lifecycle ignores it.
fn decode_registration(data: Option<&RawValue>) -> Result<Option<UserId>, ProtocolError> {
    match data {
        None => Ok(None),
        Some(raw) => serde_json::from_str(raw.get()).map_err(|source| ProtocolError::InvalidPayload {
            event: names::REGISTER_USER,
            source,
        }),
    }
}

fn payload<T: DeserializeOwned>(
    event: &'static str,
    data: Option<&RawValue>,
) -> Result<T, ProtocolError> {
    let raw = data.ok_or(ProtocolError::MissingPayload(event))?;
    serde_json::from_str(raw.get()).map_err(|source| ProtocolError::InvalidPayload { event, source })
}

/// Codec with a configurable frame limit.
#[derive(Debug, Clone, Copy)]
pub struct EventCodec {
    max_frame_size: usize,
}

impl EventCodec {
    /// Create a new codec instance with the default frame limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Create a codec with a specific frame limit.
    #[must_use]
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Get the frame limit.
    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Encode a server event.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self, event: &ServerEvent) -> Result<String, ProtocolError> {
        encode(event)
    }

    /// Decode a client event.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode(&self, text: &str) -> Result<ClientEvent, ProtocolError> {
        decode_with_limit(text, self.max_frame_size)
    }
}

impl Default for EventCodec {
    fn default() -> Self {
        Self::new()
    }
}
