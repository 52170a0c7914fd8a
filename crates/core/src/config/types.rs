use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::lock::{LockBackendKind, LockOptions};
use crate::resolver::ResolverConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    pub gateway: GatewayConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration (SQLite lock table)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("playback.db")
}

/// Single-flight lock configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LockConfig {
    /// Backend used for resolutions
    #[serde(default)]
    pub backend: LockBackendKind,
    /// Maximum wait for a non-owner
    #[serde(default = "default_lock_timeout_ms")]
    pub timeout_ms: u64,
    /// Validity of an acquired lock
    #[serde(default = "default_lock_ttl_ms")]
    pub ttl_ms: u64,
    /// How long a finished outcome stays observable
    #[serde(default = "default_lock_grace_ms")]
    pub grace_ms: u64,
    /// Poll interval for the sqlite backend
    #[serde(default = "default_lock_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: LockBackendKind::default(),
            timeout_ms: default_lock_timeout_ms(),
            ttl_ms: default_lock_ttl_ms(),
            grace_ms: default_lock_grace_ms(),
            poll_interval_ms: default_lock_poll_interval_ms(),
        }
    }
}

impl LockConfig {
    pub fn options(&self) -> LockOptions {
        LockOptions::default()
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_ttl(Duration::from_millis(self.ttl_ms))
            .with_backend(self.backend)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_lock_timeout_ms() -> u64 {
    30_000
}

fn default_lock_ttl_ms() -> u64 {
    60_000
}

fn default_lock_grace_ms() -> u64 {
    2_000
}

fn default_lock_poll_interval_ms() -> u64 {
    250
}

/// Key-value store configuration (caches and the store lock backend)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Connection URL (required when backend = "redis")
    #[serde(default)]
    pub url: Option<String>,
    /// Prefix for every key and channel
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: None,
            namespace: default_namespace(),
        }
    }
}

fn default_namespace() -> String {
    "playback:".to_string()
}

/// Available store backends
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

/// Provider gateway configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Gateway backend type
    pub backend: GatewayBackend,
    /// qBittorrent-specific configuration (required when backend = "qbittorrent")
    #[serde(default)]
    pub qbittorrent: Option<QBittorrentConfig>,
}

/// Available gateway backends
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GatewayBackend {
    #[serde(rename = "qbittorrent")]
    QBittorrent,
}

/// qBittorrent gateway configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QBittorrentConfig {
    /// WebUI URL (e.g., "http://localhost:8080")
    pub url: String,
    pub username: String,
    pub password: String,
    /// Base URL of the file server exposing qBittorrent's save path
    #[serde(default)]
    pub link_base_url: Option<String>,
    /// Save path override for added torrents
    #[serde(default)]
    pub download_path: Option<String>,
    /// Category for added torrents (also scopes listing)
    #[serde(default)]
    pub category: Option<String>,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_timeout() -> u32 {
    30
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub lock: LockConfig,
    pub store: SanitizedStoreConfig,
    pub resolver: ResolverConfig,
    pub gateway: SanitizedGatewayConfig,
}

/// Sanitized store config (URL may carry credentials)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStoreConfig {
    pub backend: StoreBackend,
    pub url_configured: bool,
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedGatewayConfig {
    pub backend: GatewayBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qbittorrent: Option<SanitizedQBittorrentConfig>,
}

/// Sanitized qBittorrent config (password hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedQBittorrentConfig {
    pub url: String,
    pub username: String,
    pub password_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_base_url: Option<String>,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            lock: config.lock.clone(),
            store: SanitizedStoreConfig {
                backend: config.store.backend,
                url_configured: config.store.url.is_some(),
                namespace: config.store.namespace.clone(),
            },
            resolver: config.resolver.clone(),
            gateway: SanitizedGatewayConfig {
                backend: config.gateway.backend,
                qbittorrent: config.gateway.qbittorrent.as_ref().map(|q| {
                    SanitizedQBittorrentConfig {
                        url: q.url.clone(),
                        username: q.username.clone(),
                        password_configured: !q.password.is_empty(),
                        link_base_url: q.link_base_url.clone(),
                        timeout_secs: q.timeout_secs,
                    }
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[gateway]
backend = "qbittorrent"

[gateway.qbittorrent]
url = "http://localhost:8080"
username = "admin"
password = "secret"
"#;

    #[test]
    fn test_deserialize_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "playback.db");
        assert_eq!(config.lock.backend, LockBackendKind::Memory);
        assert_eq!(config.lock.timeout_ms, 30_000);
        assert_eq!(config.lock.ttl_ms, 60_000);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.namespace, "playback:");
        assert_eq!(config.resolver.poll_attempts, 10);

        let qb = config.gateway.qbittorrent.as_ref().unwrap();
        assert_eq!(qb.timeout_secs, 30);
        assert!(qb.link_base_url.is_none());
    }

    #[test]
    fn test_deserialize_missing_gateway_fails() {
        let toml = r#"
[server]
port = 8080
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_lock_and_store_sections() {
        let toml = format!(
            r#"
[lock]
backend = "store"
timeout_ms = 5000

[store]
backend = "redis"
url = "redis://:pw@localhost:6379"
namespace = "aio:"
{}"#,
            MINIMAL
        );
        let config: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config.lock.backend, LockBackendKind::Store);

        let options = config.lock.options();
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert_eq!(options.ttl, Duration::from_secs(60));
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.namespace, "aio:");
    }

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.store.url = Some("redis://:pw@localhost:6379".to_string());

        let sanitized = SanitizedConfig::from(&config);
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains(":pw@"));
        assert!(sanitized.store.url_configured);

        let qb = sanitized.gateway.qbittorrent.as_ref().unwrap();
        assert!(qb.password_configured);
        assert_eq!(qb.username, "admin");
    }
}
