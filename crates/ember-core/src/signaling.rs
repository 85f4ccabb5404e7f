//! Call signaling pass-through.
//!
//! Offers, answers and ICE candidates are addressed by user, not by call.
//! Nothing here tracks call progress; clients correlate the sequence.

use ember_protocol::{AnswerCall, CallUser, IceCandidate, ServerEvent};
use std::sync::Arc;
use tracing::debug;

use crate::relay::{Delivery, EventRelay};

/// Forwards signaling payloads to the addressed peer.
#[derive(Debug, Clone)]
pub struct SignalingHandler {
    relay: Arc<EventRelay>,
}

impl SignalingHandler {
    /// Create a handler over a shared relay.
    #[must_use]
    pub fn new(relay: Arc<EventRelay>) -> Self {
        Self { relay }
    }

    /// `call-user` becomes `incoming-call` for the callee.
    pub fn call_user(&self, call: CallUser) -> Delivery {
        debug!(from = %call.from, to = %call.to, "Call offer");
        self.relay.deliver(
            &call.to,
            &ServerEvent::IncomingCall {
                from: call.from,
                offer: call.offer,
            },
        )
    }

    /// `answer-call` becomes `call-answered` for the caller.
    pub fn answer_call(&self, answer: AnswerCall) -> Delivery {
        debug!(to = %answer.to, "Call answer");
        self.relay.deliver(
            &answer.to,
            &ServerEvent::CallAnswered {
                answer: answer.answer,
            },
        )
    }

    /// `ice-candidate` is forwarded to the peer unchanged.
    pub fn ice_candidate(&self, candidate: IceCandidate) -> Delivery {
        self.relay.deliver(
            &candidate.to,
            &ServerEvent::IceCandidate {
                candidate: candidate.candidate,
            },
        )
    }
}
