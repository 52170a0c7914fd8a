//! Types for playback resolution.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::gateway::{ContentSource, DownloadStatus, ProviderError};
use crate::matcher::ExpectedMetadata;

/// A request to turn a content identifier into a playable link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackRequest {
    /// Torrent info hash or usenet release identifier.
    pub hash: String,
    /// NZB location, for usenet content.
    #[serde(default)]
    pub nzb_url: Option<String>,
    #[serde(default)]
    pub expected: Option<ExpectedMetadata>,
    /// Filename chosen for this content before.
    #[serde(default)]
    pub filename: Option<String>,
    /// File index chosen for this content before.
    #[serde(default)]
    pub index: Option<i64>,
    /// Wait for a download that is not ready yet.
    #[serde(default)]
    pub cache_and_play: bool,
    /// Address of the requesting client.
    #[serde(default)]
    pub client_ip: Option<String>,
}

impl PlaybackRequest {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            ..Default::default()
        }
    }

    pub fn with_expected(mut self, expected: ExpectedMetadata) -> Self {
        self.expected = Some(expected);
        self
    }

    pub fn with_nzb(mut self, url: impl Into<String>) -> Self {
        self.nzb_url = Some(url.into());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_cache_and_play(mut self, cache_and_play: bool) -> Self {
        self.cache_and_play = cache_and_play;
        self
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    /// What to hand to the provider.
    pub fn source(&self) -> ContentSource {
        match &self.nzb_url {
            Some(url) => ContentSource::Nzb { url: url.clone() },
            None => ContentSource::Torrent {
                hash: self.hash.clone(),
            },
        }
    }

    /// Digest of every input that can change the outcome, scoped to one
    /// service and credential set.
    pub fn resolution_key(&self, service: &str, credential_fingerprint: &str) -> String {
        let expected = self.expected.clone().unwrap_or_default();
        let number = |n: Option<u32>| n.map(|n| n.to_string()).unwrap_or_default();

        let mut hasher = Sha256::new();
        for part in [
            service.to_string(),
            credential_fingerprint.to_string(),
            self.hash.to_lowercase(),
            self.nzb_url.clone().unwrap_or_default(),
            number(expected.season),
            number(expected.episode),
            number(expected.absolute_episode),
            number(expected.year),
            expected.titles.join("\u{1f}"),
            self.filename.clone().unwrap_or_default(),
            self.index.map(|i| i.to_string()).unwrap_or_default(),
            self.cache_and_play.to_string(),
            self.client_ip.clone().unwrap_or_default(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0]);
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

/// Outcome of a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Resolution {
    Ready {
        url: String,
        filename: String,
        size: u64,
    },
    NotReady {
        status: DownloadStatus,
    },
}

impl Resolution {
    pub fn is_ready(&self) -> bool {
        matches!(self, Resolution::Ready { .. })
    }
}

/// Errors that end a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ResolveError {
    #[error("No matching file among {} candidates", .available.len())]
    NoMatchingFile { available: Vec<String> },

    #[error("Provider error: {0}")]
    Provider(ProviderError),

    #[error("Timed out waiting for a concurrent resolution of the same request")]
    LockTimeout,

    #[error("Lock backend error: {0}")]
    LockBackend(String),

    #[error("Cache error: {0}")]
    Cache(String),
}

impl ResolveError {
    /// Transient failures; the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            ResolveError::LockTimeout => true,
            ResolveError::Provider(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<ProviderError> for ResolveError {
    fn from(e: ProviderError) -> Self {
        ResolveError::Provider(e)
    }
}
