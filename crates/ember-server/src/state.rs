//! Shared server state.

use ember_core::Realtime;
use ember_transport::ConnectionHub;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::store::Store;

/// Everything a handler needs, built once at startup.
pub struct AppState {
    /// Live sockets and their outbound queues.
    pub hub: Arc<ConnectionHub>,
    /// Presence registry, relay, signaling and bridge.
    pub realtime: Realtime,
    /// Durable store.
    pub store: Arc<dyn Store>,
    /// One permit per allowed socket, taken before the upgrade.
    pub connection_slots: Arc<Semaphore>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state around a store.
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn Store>) -> Self {
        let hub = Arc::new(ConnectionHub::new());
        let realtime = Realtime::new(hub.clone());
        let connection_slots = Arc::new(Semaphore::new(config.limits.max_connections));

        Self {
            hub,
            realtime,
            store,
            connection_slots,
            config,
        }
    }
}
