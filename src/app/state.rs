//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::hub::{ClientRegistry, Hub, HubHandle, HubMetrics};
use crate::store::{ResultSink, UserDirectory};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub clients: Arc<ClientRegistry>,
    pub hub: HubHandle,
    pub directory: UserDirectory,
    pub metrics: Arc<HubMetrics>,
}

impl AppState {
    /// Build the state and the hub task that owns all game state. The
    /// caller spawns the returned hub.
    pub fn new(config: Config) -> (Self, Hub) {
        let config = Arc::new(config);

        let clients = Arc::new(ClientRegistry::new());
        let metrics = Arc::new(HubMetrics::default());
        let results = ResultSink::new(config.results_url.clone());
        let directory = UserDirectory::new(config.user_directory_url.clone());

        let (hub, handle) = Hub::new(clients.clone(), results, metrics.clone());

        let state = Self {
            config,
            clients,
            hub: handle,
            directory,
            metrics,
        };

        (state, hub)
    }
}
