//! # ember-transport
//!
//! Connection plumbing for the Ember realtime relay.
//!
//! - **ConnectionId** - Opaque handle naming one live channel
//! - **EventSink** - The single "send this event to that connection" seam
//! - **ConnectionHub** - Per-connection FIFO outbound queues drained by the
//!   socket writer
//!
//! ```rust
//! use ember_protocol::{ServerEvent, UserId};
//! use ember_transport::{ConnectionHub, EventSink};
//!
//! let hub = ConnectionHub::new();
//! let (conn, mut outbound) = hub.attach();
//!
//! let event = ServerEvent::NewLike {
//!     from: UserId::new("alice"),
//!     message: "alice liked your profile.".into(),
//! };
//! hub.send_event(&conn, &event).unwrap();
//! assert!(outbound.try_recv().unwrap().contains("new-like"));
//! ```

pub mod hub;
pub mod traits;

pub use hub::ConnectionHub;
pub use traits::{ConnectionId, EventSink, TransportError};
