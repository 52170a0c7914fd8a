pub mod config;
pub mod gateway;
pub mod lock;
pub mod matcher;
pub mod metrics;
pub mod parser;
pub mod resolver;
pub mod selector;
pub mod store;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use gateway::{
    Availability, CandidateDownload, CandidateFile, ContentSource, DownloadStatus, ProviderError,
    ProviderGateway, QBittorrentGateway,
};
pub use lock::{DistributedLock, LockBackendKind, LockError, LockOptions, LockResult};
pub use matcher::{ExpectedMetadata, TitleMatchMode};
pub use parser::{ParsedTitle, SceneTitleParser, TitleParser};
pub use resolver::{PlaybackRequest, Resolution, ResolveError, Resolver, ResolverConfig};
pub use selector::{FileSelector, SelectOptions};
pub use store::{Cache, KeyValueStore, MemoryStore, PubSubStore, RedisStore, StoreError};
