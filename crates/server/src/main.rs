use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use playback_core::config::{GatewayBackend, StoreBackend};
use playback_core::lock::create_sqlite_lock;
use playback_core::{
    load_config, validate_config, Config, DistributedLock, KeyValueStore, LockBackendKind,
    MemoryStore, ProviderGateway, PubSubStore, QBittorrentGateway, RedisStore, Resolver,
};
use playback_server::api::create_router;
use playback_server::state::AppState;

/// Buffer size for the sqlite lock command channel
const LOCK_BUFFER_SIZE: usize = 256;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("PLAYBACK_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Lock backend: {}", config.lock.backend);

    // Shared store for caches and the store lock backend
    let (kv_store, pubsub_store): (Arc<dyn KeyValueStore>, Arc<dyn PubSubStore>) =
        match config.store.backend {
            StoreBackend::Memory => {
                info!("Using in-process store");
                let store = Arc::new(MemoryStore::new());
                (
                    store.clone() as Arc<dyn KeyValueStore>,
                    store as Arc<dyn PubSubStore>,
                )
            }
            StoreBackend::Redis => {
                let url = config
                    .store
                    .url
                    .as_deref()
                    .ok_or_else(|| anyhow!("store.url is required for the redis backend"))?;
                info!("Connecting to redis store");
                let store = Arc::new(
                    RedisStore::connect(url)
                        .await
                        .context("Failed to connect to redis")?,
                );
                (
                    store.clone() as Arc<dyn KeyValueStore>,
                    store as Arc<dyn PubSubStore>,
                )
            }
        };

    // Single-flight lock with every configured backend
    let (lock, lock_writer) = build_lock(&config, pubsub_store)?;

    // Provider gateway
    let gateway = build_gateway(&config)?;
    info!("Using gateway: {}", gateway.name());

    let resolver = Arc::new(Resolver::new(
        gateway,
        lock,
        kv_store,
        &config.store.namespace,
        config.lock.options(),
        config.resolver.clone(),
    ));

    let state = Arc::new(AppState::new(config.clone(), resolver));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown. Connect info carries the peer
    // address used when no proxy headers are present.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server shutting down...");

    // The router (and every lock handle inside it) is gone, so the writer's
    // channel closes once pending commands drain.
    if let Some(writer) = lock_writer {
        let _ = writer.await;
        info!("Lock table writer stopped");
    }

    Ok(())
}

fn build_lock(
    config: &Config,
    store: Arc<dyn PubSubStore>,
) -> Result<(DistributedLock, Option<JoinHandle<()>>)> {
    let mut lock = DistributedLock::new()
        .with_grace(config.lock.grace())
        .with_store(store, config.store.namespace.clone());

    // The sqlite table is only opened when something uses it
    let writer = if config.lock.backend == LockBackendKind::Sqlite {
        let (backend, writer) = create_sqlite_lock(
            &config.database.path,
            config.lock.poll_interval(),
            LOCK_BUFFER_SIZE,
        )
        .context("Failed to open lock table")?;
        info!("Lock table initialized at {:?}", config.database.path);
        lock = lock.with_backend(Arc::new(backend));
        Some(tokio::spawn(writer.run()))
    } else {
        None
    };

    Ok((lock, writer))
}

fn build_gateway(config: &Config) -> Result<Arc<dyn ProviderGateway>> {
    match config.gateway.backend {
        GatewayBackend::QBittorrent => {
            let qbit_config = config
                .gateway
                .qbittorrent
                .clone()
                .ok_or_else(|| {
                    anyhow!("qBittorrent backend selected but no qbittorrent config provided")
                })?;
            info!("Initializing qBittorrent gateway at {}", qbit_config.url);
            let gateway = QBittorrentGateway::new(qbit_config)
                .context("Failed to create qBittorrent gateway")?;
            Ok(Arc::new(gateway))
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
