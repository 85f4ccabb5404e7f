//! Post-commit notification bridge.
//!
//! REST handlers describe what they durably did as an [`Action`]; the bridge
//! turns it into realtime pushes. [`NotificationBridge::after_commit`] takes
//! the write itself, so a notification can only ever follow a successful
//! write and a failed push can never fail the write.

use ember_protocol::{ServerEvent, UserId};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::relay::{Delivery, EventRelay};

const ANONYMOUS: &str = "Someone";

/// A durable action that has already been committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// `from` sent `message` to `to`.
    MessageSent {
        from: UserId,
        to: UserId,
        message: String,
    },
    /// `reader` marked the messages `sender` sent them as read.
    MessagesRead { reader: UserId, sender: UserId },
    /// `from` liked `to`'s profile. `mutual` when `to` already liked `from`.
    ProfileLiked {
        from: UserId,
        from_name: Option<String>,
        to: UserId,
        to_name: Option<String>,
        mutual: bool,
    },
}

impl Action {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Action::MessageSent { .. } => "message_sent",
            Action::MessagesRead { .. } => "messages_read",
            Action::ProfileLiked { .. } => "profile_liked",
        }
    }

    /// The pushes this action produces, in delivery order.
    #[must_use]
    pub fn events(&self) -> Vec<(UserId, ServerEvent)> {
        match self {
            Action::MessageSent { from, to, message } => vec![(
                to.clone(),
                ServerEvent::NewMessage {
                    from: from.clone(),
                    message: message.clone(),
                },
            )],
            Action::MessagesRead { reader, sender } => vec![(
                sender.clone(),
                ServerEvent::MessageRead {
                    from: reader.clone(),
                    to: sender.clone(),
                },
            )],
            Action::ProfileLiked {
                from,
                from_name,
                to,
                to_name,
                mutual,
            } => {
                let from_name = display_name(from_name);
                let mut events = vec![(
                    to.clone(),
                    ServerEvent::NewLike {
                        from: from.clone(),
                        message: format!("{} liked your profile.", from_name),
                    },
                )];

                if *mutual {
                    let to_name = display_name(to_name);
                    events.push((
                        from.clone(),
                        ServerEvent::FriendRequestAccepted {
                            by: to.clone(),
                            message: format!("You and {} are now friends.", to_name),
                        },
                    ));
                    events.push((
                        to.clone(),
                        ServerEvent::FriendRequestAccepted {
                            by: from.clone(),
                            message: format!("You and {} are now friends.", from_name),
                        },
                    ));
                }
                events
            }
        }
    }
}

fn display_name(name: &Option<String>) -> &str {
    name.as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(ANONYMOUS)
}

/// Turns committed actions into best-effort pushes through the relay.
#[derive(Debug, Clone)]
pub struct NotificationBridge {
    relay: Arc<EventRelay>,
}

impl NotificationBridge {
    /// Create a bridge over a shared relay.
    #[must_use]
    pub fn new(relay: Arc<EventRelay>) -> Self {
        Self { relay }
    }

    /// Push the events for an already-committed action.
    ///
    /// Never fails; the outcomes are returned for observability only.
    pub fn notify(&self, action: &Action) -> Vec<Delivery> {
        let outcomes: Vec<Delivery> = action
            .events()
            .into_iter()
            .map(|(target, event)| self.relay.deliver(&target, &event))
            .collect();

        debug!(
            action = action.kind(),
            attempted = outcomes.len(),
            sent = outcomes.iter().filter(|d| d.is_sent()).count(),
            "Bridge notified"
        );
        outcomes
    }

    /// Run a durable write, then notify for whatever it committed.
    ///
    /// `derive` sees only a successful result and may return `None` when the
    /// write changed nothing worth announcing. The write's own result comes
    /// back unchanged, next to the delivery outcomes of any pushes.
    ///
    /// # Errors
    ///
    /// Returns the write's error, in which case nothing is pushed.
    pub async fn after_commit<T, E, W, D>(&self, write: W, derive: D) -> Result<(T, Vec<Delivery>), E>
    where
        W: Future<Output = Result<T, E>>,
        D: FnOnce(&T) -> Option<Action>,
    {
        let committed = write.await?;
        let outcomes = match derive(&committed) {
            Some(action) => self.notify(&action),
            None => Vec::new(),
        };
        Ok((committed, outcomes))
    }
}
