//! Testing utilities and mock implementations.
//!
//! # Example
//!
//! ```rust,ignore
//! use playback_core::testing::{fixtures, MockGateway};
//!
//! let gateway = MockGateway::new();
//! gateway.add_download(fixtures::season_pack("abc", "Show", 1, 8)).await;
//! gateway.set_latency(Duration::from_millis(50));
//! ```

mod mock_gateway;

pub use mock_gateway::MockGateway;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::gateway::{CandidateDownload, CandidateFile, DownloadStatus};

    const GIB: u64 = 1024 * 1024 * 1024;
    const MIB: u64 = 1024 * 1024;

    /// A finished download with the given files.
    pub fn download(hash: &str, name: &str, files: Vec<CandidateFile>) -> CandidateDownload {
        CandidateDownload {
            id: format!("mock-{}", hash.to_lowercase()),
            hash: Some(hash.to_string()),
            source_url: None,
            name: name.to_string(),
            size: files.iter().map(|f| f.size).sum(),
            status: DownloadStatus::Downloaded,
            progress: 1.0,
            files,
        }
    }

    /// A finished single-season pack named `{show}.S{season}.1080p`.
    pub fn season_pack(hash: &str, show: &str, season: u32, episodes: u32) -> CandidateDownload {
        let files = (1..=episodes)
            .map(|e| {
                CandidateFile::new(
                    format!("{}.S{:02}E{:02}.1080p.mkv", show, season, e),
                    GIB + u64::from(e) * MIB,
                )
                .with_index(i64::from(e) - 1)
            })
            .collect();
        download(hash, &format!("{}.S{:02}.1080p", show, season), files)
    }

    /// A finished movie release with a sample and an info file.
    pub fn movie_download(hash: &str, name: &str) -> CandidateDownload {
        download(
            hash,
            name,
            vec![
                CandidateFile::new(format!("{}.mkv", name), 4 * GIB).with_index(0),
                CandidateFile::new(format!("Sample/{}.sample.mkv", name), 50 * MIB).with_index(1),
                CandidateFile::new(format!("{}.nfo", name), 4096).with_index(2),
            ],
        )
    }
}
