//! qBittorrent provider gateway.
//!
//! Talks to the WebUI API for torrent state and file lists. Files are served
//! by a separate file server mapped onto qBittorrent's save path, configured
//! as `link_base_url`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::QBittorrentConfig;

use super::{
    Availability, CandidateDownload, CandidateFile, ContentSource, DownloadStatus,
    ProviderError, ProviderGateway, PSEUDO_FILE_INDEX,
};

/// qBittorrent gateway implementation.
pub struct QBittorrentGateway {
    client: Client,
    config: QBittorrentConfig,
    /// Session marker (the cookie itself lives in the client's jar).
    session: Arc<RwLock<Option<String>>>,
}

fn map_request_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else if e.is_connect() {
        ProviderError::Connection(e.to_string())
    } else {
        ProviderError::Api(e.to_string())
    }
}

fn map_status(status: reqwest::StatusCode, endpoint: &str) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::Unauthorized(format!("HTTP {}", status)),
        404 => ProviderError::NotFound(endpoint.to_string()),
        429 => ProviderError::RateLimited,
        _ => ProviderError::Api(format!("HTTP {}", status)),
    }
}

impl QBittorrentGateway {
    /// Create a new qBittorrent gateway.
    pub fn new(config: QBittorrentConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .cookie_store(true)
            .build()
            .map_err(|e| ProviderError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            session: Arc::new(RwLock::new(None)),
        })
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Login and store session cookie.
    async fn login(&self) -> Result<(), ProviderError> {
        let url = format!("{}/api/v2/auth/login", self.base_url());
        let params = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if body.contains("Ok.") {
            debug!("qBittorrent login successful");
            *self.session.write().await = Some("authenticated".to_string());
            Ok(())
        } else if body.contains("Fails.") || status.as_u16() == 403 {
            Err(ProviderError::Unauthorized("Invalid credentials".to_string()))
        } else {
            Err(ProviderError::Unauthorized(format!(
                "Unexpected response: {}",
                body.chars().take(100).collect::<String>()
            )))
        }
    }

    async fn ensure_authenticated(&self) -> Result<(), ProviderError> {
        if self.session.read().await.is_some() {
            return Ok(());
        }
        self.login().await
    }

    async fn invalidate_session(&self) {
        warn!("qBittorrent session expired, re-authenticating");
        *self.session.write().await = None;
    }

    /// Authenticated GET, retried once after re-login on 403.
    async fn get(&self, endpoint: &str) -> Result<String, ProviderError> {
        self.ensure_authenticated().await?;
        let url = format!("{}{}", self.base_url(), endpoint);

        let mut response = self.client.get(&url).send().await.map_err(map_request_error)?;
        if response.status().as_u16() == 403 {
            self.invalidate_session().await;
            self.login().await?;
            response = self.client.get(&url).send().await.map_err(map_request_error)?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status, endpoint));
        }
        response.text().await.map_err(map_request_error)
    }

    /// Authenticated multipart POST, retried once after re-login on 403.
    async fn post_multipart(
        &self,
        endpoint: &str,
        build: impl Fn() -> multipart::Form,
    ) -> Result<String, ProviderError> {
        self.ensure_authenticated().await?;
        let url = format!("{}{}", self.base_url(), endpoint);

        let mut response = self
            .client
            .post(&url)
            .multipart(build())
            .send()
            .await
            .map_err(map_request_error)?;
        if response.status().as_u16() == 403 {
            self.invalidate_session().await;
            self.login().await?;
            response = self
                .client
                .post(&url)
                .multipart(build())
                .send()
                .await
                .map_err(map_request_error)?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status, endpoint));
        }
        response.text().await.map_err(map_request_error)
    }

    async fn torrents(&self, hashes: &[String]) -> Result<Vec<QBTorrentInfo>, ProviderError> {
        let mut endpoint = "/api/v2/torrents/info".to_string();
        if !hashes.is_empty() {
            let joined = hashes
                .iter()
                .map(|h| h.to_lowercase())
                .collect::<Vec<_>>()
                .join("|");
            endpoint.push_str(&format!("?hashes={}", urlencoding::encode(&joined)));
        } else if let Some(category) = &self.config.category {
            endpoint.push_str(&format!("?category={}", urlencoding::encode(category)));
        }

        let response = self.get(&endpoint).await?;
        serde_json::from_str(&response)
            .map_err(|e| ProviderError::Api(format!("Failed to parse response: {}", e)))
    }

    async fn files(&self, hash: &str) -> Result<Vec<CandidateFile>, ProviderError> {
        let endpoint = format!("/api/v2/torrents/files?hash={}", hash.to_lowercase());
        let response = self.get(&endpoint).await?;
        let files: Vec<QBFile> = serde_json::from_str(&response)
            .map_err(|e| ProviderError::Api(format!("Failed to parse response: {}", e)))?;

        Ok(files
            .into_iter()
            .enumerate()
            .map(|(position, f)| {
                CandidateFile::new(f.name, f.size.max(0) as u64)
                    .with_index(f.index.unwrap_or(position as i64))
            })
            .collect())
    }
}

/// qBittorrent torrent info response (fields this gateway reads).
#[derive(Debug, Deserialize)]
struct QBTorrentInfo {
    hash: String,
    name: String,
    state: String,
    progress: f64,
    size: i64,
}

impl QBTorrentInfo {
    fn into_download(self) -> CandidateDownload {
        let hash = self.hash.to_lowercase();
        CandidateDownload {
            id: hash.clone(),
            hash: Some(hash),
            source_url: None,
            name: self.name,
            size: self.size.max(0) as u64,
            status: parse_qb_state(&self.state, self.progress),
            progress: self.progress,
            files: Vec::new(),
        }
    }
}

/// qBittorrent file entry.
#[derive(Debug, Deserialize)]
struct QBFile {
    /// Present on qBittorrent 4.2+.
    #[serde(default)]
    index: Option<i64>,
    name: String,
    size: i64,
}

/// Map qBittorrent state onto a download status.
fn parse_qb_state(state: &str, progress: f64) -> DownloadStatus {
    match state {
        "error" | "missingFiles" => DownloadStatus::Failed,
        _ if progress >= 1.0 => DownloadStatus::Downloaded,
        "uploading" | "forcedUP" | "stalledUP" | "pausedUP" | "stoppedUP" | "queuedUP"
        | "checkingUP" => DownloadStatus::Downloaded,
        "downloading" | "forcedDL" | "metaDL" | "forcedMetaDL" | "allocating" | "stalledDL"
        | "checkingDL" | "checkingResumeData" | "moving" => DownloadStatus::Downloading,
        "queuedDL" | "pausedDL" | "stoppedDL" => DownloadStatus::Queued,
        _ => DownloadStatus::Unknown,
    }
}

/// Percent-encode each segment of a relative path.
fn encode_path(path: &str) -> String {
    path.split(['/', '\\'])
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::encode(s).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl ProviderGateway for QBittorrentGateway {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    fn credential_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.base_url().as_bytes());
        hasher.update([0]);
        hasher.update(self.config.username.as_bytes());
        hasher.update([0]);
        hasher.update(self.config.password.as_bytes());
        let digest = hasher.finalize();
        digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
    }

    async fn check_availability(
        &self,
        hashes: &[String],
    ) -> Result<Vec<Availability>, ProviderError> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }
        let known = self.torrents(hashes).await?;

        Ok(hashes
            .iter()
            .map(|hash| Availability {
                hash: hash.clone(),
                cached: known.iter().any(|t| {
                    t.hash.eq_ignore_ascii_case(hash)
                        && parse_qb_state(&t.state, t.progress).is_ready()
                }),
            })
            .collect())
    }

    async fn add_content(
        &self,
        source: &ContentSource,
    ) -> Result<CandidateDownload, ProviderError> {
        let ContentSource::Torrent { hash } = source else {
            return Err(ProviderError::Unsupported(
                "qBittorrent cannot download NZB content".to_string(),
            ));
        };
        let Some(magnet) = source.magnet_uri() else {
            return Err(ProviderError::Unsupported("No magnet for source".to_string()));
        };

        self.post_multipart("/api/v2/torrents/add", || {
            let mut form = multipart::Form::new().text("urls", magnet.clone());
            if let Some(path) = &self.config.download_path {
                form = form.text("savepath", path.clone());
            }
            if let Some(category) = &self.config.category {
                form = form.text("category", category.clone());
            }
            form
        })
        .await?;
        debug!(hash = %hash, "Added torrent to qBittorrent");

        // Metadata may not be resolved yet; report it as queued until it is.
        match self.get_download(hash).await {
            Ok(download) => Ok(download),
            Err(ProviderError::NotFound(_)) => Ok(CandidateDownload {
                id: hash.to_lowercase(),
                hash: Some(hash.to_lowercase()),
                source_url: None,
                name: hash.to_lowercase(),
                size: 0,
                status: DownloadStatus::Queued,
                progress: 0.0,
                files: Vec::new(),
            }),
            Err(e) => Err(e),
        }
    }

    async fn list_downloads(&self) -> Result<Vec<CandidateDownload>, ProviderError> {
        Ok(self
            .torrents(&[])
            .await?
            .into_iter()
            .map(QBTorrentInfo::into_download)
            .collect())
    }

    async fn get_download(&self, id: &str) -> Result<CandidateDownload, ProviderError> {
        let info = self
            .torrents(&[id.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;

        let mut download = info.into_download();
        if download.status.is_ready() {
            download.files = self.files(&download.id).await?;
        }
        Ok(download)
    }

    async fn direct_link(
        &self,
        download: &CandidateDownload,
        file: &CandidateFile,
    ) -> Result<String, ProviderError> {
        let Some(base) = self.config.link_base_url.as_deref() else {
            return Err(ProviderError::Unsupported(
                "link_base_url is not configured".to_string(),
            ));
        };
        if !download.status.is_ready() {
            return Err(ProviderError::Api(format!(
                "Download {} is {}",
                download.id,
                download.status.as_str()
            )));
        }

        // qBittorrent file names already include the torrent's root folder
        let relative = if file.index == Some(PSEUDO_FILE_INDEX) {
            &download.name
        } else {
            &file.name
        };
        Ok(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            encode_path(relative)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> QBittorrentConfig {
        QBittorrentConfig {
            url: "http://localhost:8080/".to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
            link_base_url: Some("https://files.example/downloads/".to_string()),
            download_path: None,
            category: None,
            timeout_secs: 30,
        }
    }

    fn ready_download(name: &str) -> CandidateDownload {
        CandidateDownload {
            id: "abc".to_string(),
            hash: Some("abc".to_string()),
            source_url: None,
            name: name.to_string(),
            size: 100,
            status: DownloadStatus::Downloaded,
            progress: 1.0,
            files: vec![],
        }
    }

    #[test]
    fn test_parse_qb_state() {
        assert_eq!(parse_qb_state("downloading", 0.4), DownloadStatus::Downloading);
        assert_eq!(parse_qb_state("stalledDL", 0.4), DownloadStatus::Downloading);
        assert_eq!(parse_qb_state("uploading", 1.0), DownloadStatus::Downloaded);
        assert_eq!(parse_qb_state("pausedDL", 1.0), DownloadStatus::Downloaded);
        assert_eq!(parse_qb_state("queuedDL", 0.0), DownloadStatus::Queued);
        assert_eq!(parse_qb_state("missingFiles", 1.0), DownloadStatus::Failed);
        assert_eq!(parse_qb_state("something_else", 0.0), DownloadStatus::Unknown);
    }

    #[test]
    fn test_torrent_info_conversion() {
        let info = QBTorrentInfo {
            hash: "ABC123".to_string(),
            name: "Show.S01.1080p".to_string(),
            state: "downloading".to_string(),
            progress: 0.5,
            size: 1_000_000,
        };
        let download = info.into_download();
        assert_eq!(download.id, "abc123");
        assert!(download.matches_hash("ABC123"));
        assert_eq!(download.status, DownloadStatus::Downloading);
        assert_eq!(download.size, 1_000_000);
    }

    #[test]
    fn test_encode_path() {
        assert_eq!(
            encode_path("Show S01/Show S01E02 [1080p].mkv"),
            "Show%20S01/Show%20S01E02%20%5B1080p%5D.mkv"
        );
    }

    #[tokio::test]
    async fn test_direct_link_uses_file_path() {
        let gateway = QBittorrentGateway::new(config()).unwrap();
        let download = ready_download("Show S01");
        let file = CandidateFile::new("Show S01/E02.mkv", 10).with_index(1);

        let link = gateway.direct_link(&download, &file).await.unwrap();
        assert_eq!(link, "https://files.example/downloads/Show%20S01/E02.mkv");
    }

    #[tokio::test]
    async fn test_direct_link_for_pseudo_file_uses_download_name() {
        let gateway = QBittorrentGateway::new(config()).unwrap();
        let download = ready_download("Movie.2020.mkv");
        let file = CandidateFile::new("Movie.2020.mkv", 100).with_index(PSEUDO_FILE_INDEX);

        let link = gateway.direct_link(&download, &file).await.unwrap();
        assert_eq!(link, "https://files.example/downloads/Movie.2020.mkv");
    }

    #[tokio::test]
    async fn test_nzb_is_unsupported() {
        let gateway = QBittorrentGateway::new(config()).unwrap();
        let result = gateway
            .add_content(&ContentSource::Nzb {
                url: "https://indexer/nzb/1".to_string(),
            })
            .await;
        assert!(matches!(result, Err(ProviderError::Unsupported(_))));
    }

    #[test]
    fn test_credential_fingerprint_is_stable_and_secret_free() {
        let gateway = QBittorrentGateway::new(config()).unwrap();
        let fingerprint = gateway.credential_fingerprint();
        assert_eq!(fingerprint.len(), 16);
        assert_eq!(fingerprint, gateway.credential_fingerprint());
        assert!(!fingerprint.contains("secret"));

        let mut other = config();
        other.password = "different".to_string();
        let other = QBittorrentGateway::new(other).unwrap();
        assert_ne!(fingerprint, other.credential_fingerprint());
    }
}
