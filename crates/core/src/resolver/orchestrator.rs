//! Resolution orchestrator.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::gateway::{Availability, CandidateDownload, DownloadStatus, ProviderError, ProviderGateway};
use crate::lock::{DistributedLock, LockError, LockOptions};
use crate::metrics;
use crate::selector::{FileSelector, SelectOptions};
use crate::store::{Cache, KeyValueStore};

use super::{PlaybackRequest, Resolution, ResolveError, ResolverConfig};

/// Extra lock lifetime on top of the polling budget for cache-and-play.
const POLL_LOCK_MARGIN: Duration = Duration::from_secs(10);

/// Turns playback requests into direct links, one provider round trip per
/// distinct request no matter how many callers ask at once.
pub struct Resolver {
    gateway: Arc<dyn ProviderGateway>,
    lock: DistributedLock,
    selector: FileSelector,
    links: Cache<Resolution>,
    not_ready: Cache<DownloadStatus>,
    lock_options: LockOptions,
    config: ResolverConfig,
}

impl Resolver {
    /// Create a resolver. Both result caches live in `store` under `namespace`.
    pub fn new(
        gateway: Arc<dyn ProviderGateway>,
        lock: DistributedLock,
        store: Arc<dyn KeyValueStore>,
        namespace: &str,
        lock_options: LockOptions,
        config: ResolverConfig,
    ) -> Self {
        Self {
            gateway,
            lock,
            selector: FileSelector::default(),
            links: Cache::new(Arc::clone(&store), format!("{}link:", namespace)),
            not_ready: Cache::new(store, format!("{}not_ready:", namespace)),
            lock_options,
            config,
        }
    }

    /// Replace the default file selector.
    pub fn with_selector(mut self, selector: FileSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn gateway_name(&self) -> &str {
        self.gateway.name()
    }

    /// Cache and lock key for a request against this resolver's provider.
    pub fn resolution_key(&self, request: &PlaybackRequest) -> String {
        request.resolution_key(self.gateway.name(), &self.gateway.credential_fingerprint())
    }

    /// Resolve a request to a playable link or a "not ready yet" answer.
    pub async fn resolve(&self, request: &PlaybackRequest) -> Result<Resolution, ResolveError> {
        let started = Instant::now();
        let key = self.resolution_key(request);

        if let Some(resolution) = self.cached(request, &key).await? {
            metrics::RESOLUTIONS.with_label_values(&["cached"]).inc();
            debug!(hash = %request.hash, "Resolution served from cache");
            return Ok(resolution);
        }

        let lock_key = format!("resolve:{}", key);
        let options = self.lock_options_for(request);
        let outcome = self
            .lock
            .with_lock(&lock_key, || self.resolve_uncached(request, &key), &options)
            .await;

        let (label, result) = match outcome {
            Ok(locked) => {
                let label = match (&locked.result, locked.cached) {
                    (_, true) => "cached",
                    (Resolution::Ready { .. }, false) => "ready",
                    (Resolution::NotReady { .. }, false) => "not_ready",
                };
                (label, Ok(locked.result))
            }
            Err(e) => {
                let e = map_lock_error(e);
                let label = match &e {
                    ResolveError::NoMatchingFile { .. } => "no_matching_file",
                    ResolveError::Provider(_) => "provider_error",
                    _ => "lock_error",
                };
                (label, Err(e))
            }
        };

        metrics::RESOLUTIONS.with_label_values(&[label]).inc();
        metrics::RESOLUTION_DURATION
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());
        result
    }

    /// Which hashes the provider can serve immediately.
    pub async fn check_availability(
        &self,
        hashes: &[String],
    ) -> Result<Vec<Availability>, ResolveError> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.gateway.check_availability(hashes).await?)
    }

    async fn cached(
        &self,
        request: &PlaybackRequest,
        key: &str,
    ) -> Result<Option<Resolution>, ResolveError> {
        if let Some(resolution) = self.links.get(key).await.map_err(cache_error)? {
            return Ok(Some(resolution));
        }
        if request.cache_and_play {
            return Ok(None);
        }
        Ok(self
            .not_ready
            .get(key)
            .await
            .map_err(cache_error)?
            .map(|status| Resolution::NotReady { status }))
    }

    fn lock_options_for(&self, request: &PlaybackRequest) -> LockOptions {
        let options = self.lock_options;
        if !request.cache_and_play {
            return options;
        }
        let budget = self.config.max_poll_duration() + POLL_LOCK_MARGIN;
        let timeout = options.timeout.max(budget);
        let ttl = options.ttl.max(budget);
        options.with_timeout(timeout).with_ttl(ttl)
    }

    /// Provider round trip. Runs under the lock.
    async fn resolve_uncached(
        &self,
        request: &PlaybackRequest,
        key: &str,
    ) -> Result<Resolution, ResolveError> {
        let download = self.find_or_add(request).await?;
        fail_if_failed(&download)?;

        let download = if download.status.is_ready() {
            download
        } else if request.cache_and_play {
            self.wait_until_ready(download).await?
        } else {
            download
        };

        if !download.status.is_ready() {
            info!(
                hash = %request.hash,
                status = download.status.as_str(),
                progress = download.progress,
                "Download not ready"
            );
            if let Err(e) = self
                .not_ready
                .set(key, &download.status, self.config.not_ready_ttl())
                .await
            {
                warn!("Failed to cache not-ready status for {}: {}", request.hash, e);
            }
            return Ok(Resolution::NotReady {
                status: download.status,
            });
        }

        let options = SelectOptions {
            title_match: self.config.title_match,
            preferred_index: request.index,
            preferred_filename: request.filename.clone(),
        };
        let Some(file) = self
            .selector
            .select(&download, request.expected.as_ref(), &options)
        else {
            return Err(ResolveError::NoMatchingFile {
                available: download.files.iter().map(|f| f.name.clone()).collect(),
            });
        };

        let url = match &file.link {
            Some(link) => link.clone(),
            None => self.gateway.direct_link(&download, &file).await?,
        };

        let resolution = Resolution::Ready {
            url,
            filename: file.name,
            size: file.size,
        };
        if let Err(e) = self
            .links
            .set(key, &resolution, self.config.link_ttl())
            .await
        {
            warn!("Failed to cache link for {}: {}", request.hash, e);
        }
        info!(hash = %request.hash, download = %download.name, "Resolved playback link");
        Ok(resolution)
    }

    /// Existing download for the request, or a freshly submitted one.
    async fn find_or_add(
        &self,
        request: &PlaybackRequest,
    ) -> Result<CandidateDownload, ProviderError> {
        let source = request.source();
        // The identifier may also be the provider's own id for the item
        let existing = self
            .gateway
            .list_downloads()
            .await?
            .into_iter()
            .find(|d| d.matches_source(&source) || d.id == request.hash);

        match existing {
            Some(download) => {
                debug!(hash = %request.hash, id = %download.id, "Download already on account");
                self.gateway.get_download(&download.id).await
            }
            None => {
                info!(hash = %request.hash, "Submitting content to {}", self.gateway.name());
                self.gateway.add_content(&source).await
            }
        }
    }

    /// Poll until the download is ready or the attempts run out. Returns the
    /// last known state either way.
    async fn wait_until_ready(
        &self,
        mut download: CandidateDownload,
    ) -> Result<CandidateDownload, ResolveError> {
        for attempt in 1..=self.config.poll_attempts {
            tokio::time::sleep(self.config.poll_interval()).await;
            metrics::PROVIDER_POLLS.inc();

            download = self.gateway.get_download(&download.id).await?;
            fail_if_failed(&download)?;
            debug!(
                id = %download.id,
                attempt,
                status = download.status.as_str(),
                "Polled download"
            );
            if download.status.is_ready() {
                break;
            }
        }
        Ok(download)
    }
}

fn fail_if_failed(download: &CandidateDownload) -> Result<(), ProviderError> {
    if download.status == DownloadStatus::Failed {
        return Err(ProviderError::DownloadFailed(download.name.clone()));
    }
    Ok(())
}

fn cache_error(e: crate::store::StoreError) -> ResolveError {
    ResolveError::Cache(e.to_string())
}

fn map_lock_error(e: LockError<ResolveError>) -> ResolveError {
    match e {
        LockError::Failed(e) => e,
        LockError::Timeout { .. } => ResolveError::LockTimeout,
        LockError::Backend(e) => ResolveError::LockBackend(e.to_string()),
        LockError::Serialization(message) => ResolveError::LockBackend(message),
        LockError::BackendNotConfigured(kind) => {
            ResolveError::LockBackend(format!("lock backend '{}' is not configured", kind))
        }
    }
}
