use std::sync::Arc;
use playback_core::{Config, Resolver, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    resolver: Arc<Resolver>,
}

impl AppState {
    pub fn new(config: Config, resolver: Arc<Resolver>) -> Self {
        Self { config, resolver }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn resolver(&self) -> &Resolver {
        self.resolver.as_ref()
    }
}
