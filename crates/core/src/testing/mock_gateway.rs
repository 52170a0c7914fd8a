//! Mock provider gateway for testing.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::gateway::{
    Availability, CandidateDownload, CandidateFile, ContentSource, DownloadStatus, ProviderError,
    ProviderGateway,
};

/// Mock implementation of the ProviderGateway trait.
///
/// Provides controllable behavior for testing:
/// - Pre-populate downloads and instantly cached hashes
/// - Count provider calls per operation
/// - Make pending downloads finish after a number of polls
/// - Inject latency and one-shot failures
#[derive(Debug, Clone)]
pub struct MockGateway {
    downloads: Arc<RwLock<HashMap<String, CandidateDownload>>>,
    polls: Arc<RwLock<HashMap<String, u32>>>,
    added: Arc<RwLock<Vec<ContentSource>>>,
    cached: Arc<RwLock<HashSet<String>>>,
    next_error: Arc<RwLock<Option<ProviderError>>>,
    ready_after: Arc<Mutex<Option<u32>>>,
    latency: Arc<Mutex<Duration>>,
    list_calls: Arc<AtomicUsize>,
    get_calls: Arc<AtomicUsize>,
    link_calls: Arc<AtomicUsize>,
    credential: String,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self::with_credential("mock-credential")
    }

    /// A mock whose credential fingerprint is `credential`.
    pub fn with_credential(credential: impl Into<String>) -> Self {
        Self {
            downloads: Arc::new(RwLock::new(HashMap::new())),
            polls: Arc::new(RwLock::new(HashMap::new())),
            added: Arc::new(RwLock::new(Vec::new())),
            cached: Arc::new(RwLock::new(HashSet::new())),
            next_error: Arc::new(RwLock::new(None)),
            ready_after: Arc::new(Mutex::new(None)),
            latency: Arc::new(Mutex::new(Duration::ZERO)),
            list_calls: Arc::new(AtomicUsize::new(0)),
            get_calls: Arc::new(AtomicUsize::new(0)),
            link_calls: Arc::new(AtomicUsize::new(0)),
            credential: credential.into(),
        }
    }

    /// Pre-populate a download.
    pub async fn add_download(&self, download: CandidateDownload) {
        self.downloads
            .write()
            .await
            .insert(download.id.clone(), download);
    }

    /// Report `hash` as instantly available.
    pub async fn mark_cached(&self, hash: &str) {
        self.cached.write().await.insert(hash.to_lowercase());
    }

    /// Pending downloads become ready on their `polls`-th status poll.
    pub fn ready_after_polls(&self, polls: u32) {
        *self.ready_after.lock().unwrap() = Some(polls);
    }

    /// Delay every provider call.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: ProviderError) {
        *self.next_error.write().await = Some(error);
    }

    /// Recorded add_content calls.
    pub async fn added(&self) -> Vec<ContentSource> {
        self.added.read().await.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn link_calls(&self) -> usize {
        self.link_calls.load(Ordering::SeqCst)
    }

    async fn begin_call(&self) -> Result<(), ProviderError> {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match self.next_error.write().await.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProviderGateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    fn credential_fingerprint(&self) -> String {
        self.credential.clone()
    }

    async fn check_availability(
        &self,
        hashes: &[String],
    ) -> Result<Vec<Availability>, ProviderError> {
        self.begin_call().await?;
        let cached = self.cached.read().await;
        Ok(hashes
            .iter()
            .map(|hash| Availability {
                hash: hash.clone(),
                cached: cached.contains(&hash.to_lowercase()),
            })
            .collect())
    }

    async fn add_content(&self, source: &ContentSource) -> Result<CandidateDownload, ProviderError> {
        self.begin_call().await?;
        self.added.write().await.push(source.clone());

        let mut downloads = self.downloads.write().await;
        if let Some(existing) = downloads.values().find(|d| d.matches_source(source)) {
            return Ok(existing.clone());
        }

        let (id, hash, source_url, name) = match source {
            ContentSource::Torrent { hash } => (
                format!("mock-{}", hash.to_lowercase()),
                Some(hash.clone()),
                None,
                format!("Mock Download {}", hash),
            ),
            ContentSource::Nzb { url } => {
                let n = downloads.len() + 1;
                (
                    format!("mock-nzb-{}", n),
                    None,
                    Some(url.clone()),
                    format!("Mock NZB {}", n),
                )
            }
        };

        let download = CandidateDownload {
            id: id.clone(),
            hash,
            source_url,
            name,
            size: 700 * 1024 * 1024,
            status: DownloadStatus::Queued,
            progress: 0.0,
            files: Vec::new(),
        };
        downloads.insert(id, download.clone());
        Ok(download)
    }

    async fn list_downloads(&self) -> Result<Vec<CandidateDownload>, ProviderError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.begin_call().await?;
        Ok(self.downloads.read().await.values().cloned().collect())
    }

    async fn get_download(&self, id: &str) -> Result<CandidateDownload, ProviderError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.begin_call().await?;

        let mut downloads = self.downloads.write().await;
        let download = downloads
            .get_mut(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;

        let ready_after = *self.ready_after.lock().unwrap();
        if let Some(ready_after) = ready_after {
            if !download.status.is_ready() && download.status != DownloadStatus::Failed {
                let mut polls = self.polls.write().await;
                let count = polls.entry(id.to_string()).or_insert(0);
                *count += 1;
                if *count >= ready_after {
                    download.status = DownloadStatus::Downloaded;
                    download.progress = 1.0;
                } else {
                    download.status = DownloadStatus::Downloading;
                    download.progress = f64::from(*count) / f64::from(ready_after);
                }
            }
        }
        Ok(download.clone())
    }

    async fn direct_link(
        &self,
        download: &CandidateDownload,
        file: &CandidateFile,
    ) -> Result<String, ProviderError> {
        self.link_calls.fetch_add(1, Ordering::SeqCst);
        self.begin_call().await?;
        Ok(format!("https://mock.example/{}/{}", download.id, file.name))
    }
}
