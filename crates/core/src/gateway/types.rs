//! Types for provider gateway operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Index given to the pseudo-file synthesized for downloads without a file list.
pub const PSEUDO_FILE_INDEX: i64 = -1;

/// Errors reported by a provider, already classified by the gateway.
///
/// Serializable so a lock owner can hand the exact error to its waiters.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited by provider")]
    RateLimited,

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Download failed at provider: {0}")]
    DownloadFailed(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request timeout")]
    Timeout,
}

impl ProviderError {
    /// Transient failures worth retrying later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited | ProviderError::Connection(_) | ProviderError::Timeout
        )
    }
}

/// Processing state of a download at the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Queued,
    Downloading,
    Downloaded,
    /// Already in the provider's cache, instantly available.
    Cached,
    Failed,
    Unknown,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Queued => "queued",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Downloaded => "downloaded",
            DownloadStatus::Cached => "cached",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Unknown => "unknown",
        }
    }

    /// Files can be linked.
    pub fn is_ready(&self) -> bool {
        matches!(self, DownloadStatus::Downloaded | DownloadStatus::Cached)
    }
}

/// A file inside a download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFile {
    /// Path relative to the download root.
    pub name: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Direct link, when the provider hands them out with the listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl CandidateFile {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            index: None,
            mime_type: None,
            link: None,
        }
    }

    pub fn with_index(mut self, index: i64) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// A torrent or usenet item as known to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDownload {
    /// Provider-side identifier.
    pub id: String,
    /// Info hash, when the item is a torrent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// NZB URL the item was submitted from, when the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub name: String,
    pub size: u64,
    pub status: DownloadStatus,
    /// Download progress (0.0 - 1.0).
    pub progress: f64,
    #[serde(default)]
    pub files: Vec<CandidateFile>,
}

impl CandidateDownload {
    /// Whether this download is the torrent with `hash` (case-insensitive).
    pub fn matches_hash(&self, hash: &str) -> bool {
        self.hash
            .as_deref()
            .is_some_and(|h| h.eq_ignore_ascii_case(hash))
    }

    /// Whether this download came from `source`.
    pub fn matches_source(&self, source: &ContentSource) -> bool {
        match source {
            ContentSource::Torrent { hash } => self.matches_hash(hash),
            ContentSource::Nzb { url } => self.source_url.as_deref() == Some(url.as_str()),
        }
    }
}

/// What to hand to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentSource {
    Torrent { hash: String },
    Nzb { url: String },
}

impl ContentSource {
    /// Magnet URI for torrent sources.
    pub fn magnet_uri(&self) -> Option<String> {
        match self {
            ContentSource::Torrent { hash } => {
                Some(format!("magnet:?xt=urn:btih:{}", hash.to_lowercase()))
            }
            ContentSource::Nzb { .. } => None,
        }
    }
}

/// Instant availability of one content identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub hash: String,
    pub cached: bool,
}

/// Client for one debrid/usenet/torrent provider.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Service name, part of every lock and cache key.
    fn name(&self) -> &str;

    /// Stable digest identifying the configured credentials. Never the secret itself.
    fn credential_fingerprint(&self) -> String;

    /// Which of `hashes` the provider can serve immediately.
    async fn check_availability(&self, hashes: &[String])
        -> Result<Vec<Availability>, ProviderError>;

    /// Submit a magnet or NZB.
    async fn add_content(&self, source: &ContentSource)
        -> Result<CandidateDownload, ProviderError>;

    /// All downloads known to the account.
    async fn list_downloads(&self) -> Result<Vec<CandidateDownload>, ProviderError>;

    /// Current state of one download, including its file list.
    async fn get_download(&self, id: &str) -> Result<CandidateDownload, ProviderError>;

    /// Playable link for one file of a ready download.
    async fn direct_link(
        &self,
        download: &CandidateDownload,
        file: &CandidateFile,
    ) -> Result<String, ProviderError>;
}
