//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::matchmaking::MatchRegistry;
use crate::ws::SessionGateway;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<MatchRegistry>,
    pub gateway: Arc<SessionGateway>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Initialize match registry
        let registry = MatchRegistry::new(config.ai_backfill);

        // Sessions route into the same registry the scheduler drives
        let gateway = Arc::new(SessionGateway::new(registry.clone()));

        Self {
            config,
            registry,
            gateway,
        }
    }
}
