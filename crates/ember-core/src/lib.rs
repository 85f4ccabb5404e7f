//! # ember-core
//!
//! The realtime presence and notification relay.
//!
//! - **Registry** - Which connection a logical user is reachable on
//! - **Lifecycle** - Connect / register / disconnect keep the registry honest
//! - **Relay** - Best-effort delivery of one event to one user
//! - **Signaling** - Call offer/answer/ICE pass-through between two users
//! - **Bridge** - Post-commit hook turning durable REST writes into pushes
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Lifecycle  │────▶│  Registry   │◀────│    Relay    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                                            ▲       ▲
//!                                  ┌─────────┘       └─────────┐
//!                           ┌─────────────┐             ┌─────────────┐
//!                           │  Signaling  │             │   Bridge    │
//!                           └─────────────┘             └─────────────┘
//! ```
//!
//! The registry is built once and shared through [`Realtime`]; nothing here
//! is global.

pub mod bridge;
pub mod lifecycle;
pub mod realtime;
pub mod registry;
pub mod relay;
pub mod signaling;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::{Action, NotificationBridge};
pub use lifecycle::{PresenceLifecycle, Registration, Session, SessionState};
pub use realtime::{Handled, Realtime};
pub use registry::{ConnectionRegistry, RegistryStats};
pub use relay::{Delivery, EventRelay};
pub use signaling::SignalingHandler;
