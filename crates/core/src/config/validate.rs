use super::{types::Config, ConfigError, GatewayBackend, StoreBackend};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Lock timings are positive
/// - Redis store has a URL
/// - The selected gateway has its section
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let lock = &config.lock;
    for (name, value) in [
        ("lock.timeout_ms", lock.timeout_ms),
        ("lock.ttl_ms", lock.ttl_ms),
        ("lock.poll_interval_ms", lock.poll_interval_ms),
    ] {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!("{} cannot be 0", name)));
        }
    }

    if config.store.backend == StoreBackend::Redis && config.store.url.is_none() {
        return Err(ConfigError::ValidationError(
            "store.url is required when store.backend = \"redis\"".to_string(),
        ));
    }

    if config.resolver.poll_interval_ms == 0 && config.resolver.poll_attempts > 0 {
        return Err(ConfigError::ValidationError(
            "resolver.poll_interval_ms cannot be 0".to_string(),
        ));
    }

    match config.gateway.backend {
        GatewayBackend::QBittorrent => {
            let Some(qb) = &config.gateway.qbittorrent else {
                return Err(ConfigError::ValidationError(
                    "gateway.qbittorrent section is required".to_string(),
                ));
            };
            if qb.url.is_empty() {
                return Err(ConfigError::ValidationError(
                    "gateway.qbittorrent.url cannot be empty".to_string(),
                ));
            }
        }
    }

    Ok(())
}
