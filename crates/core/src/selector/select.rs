use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::media;
use super::scoring::ScoringContext;
use super::{ScoredCandidate, SelectOptions};
use crate::gateway::{CandidateDownload, CandidateFile, PSEUDO_FILE_INDEX};
use crate::matcher::{episode_is_wrong, ExpectedMetadata};
use crate::metrics;
use crate::parser::{ParsedTitle, SceneTitleParser, TitleParser};

/// Picks the file of a download that matches the requested episode or movie.
#[derive(Clone)]
pub struct FileSelector {
    parser: Arc<dyn TitleParser>,
}

impl Default for FileSelector {
    fn default() -> Self {
        Self::new(Arc::new(SceneTitleParser::new()))
    }
}

impl FileSelector {
    pub fn new(parser: Arc<dyn TitleParser>) -> Self {
        Self { parser }
    }

    /// Select the best file, or `None` when no acceptable candidate exists.
    ///
    /// Downloads without a file list yield a pseudo-file built from the
    /// download itself. Non-video files are never returned. A winner whose
    /// episode contradicts the request is rejected unless the download's own
    /// name confirms the requested episode.
    pub fn select(
        &self,
        download: &CandidateDownload,
        expected: Option<&ExpectedMetadata>,
        options: &SelectOptions,
    ) -> Option<CandidateFile> {
        if download.files.is_empty() {
            metrics::SELECTIONS.with_label_values(&["single_file"]).inc();
            return Some(
                CandidateFile::new(download.name.clone(), download.size)
                    .with_index(PSEUDO_FILE_INDEX),
            );
        }

        let container = self.parser.parse(&download.name);
        let parsed = self.parse_all(&download.files);
        let ranked = self.rank_parsed(download, &container, &parsed, expected, options);

        let Some(winner) = ranked.first() else {
            metrics::SELECTIONS.with_label_values(&["no_candidates"]).inc();
            warn!(
                download = %download.name,
                available = ?download.files.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
                "No playable file in download"
            );
            return None;
        };

        if let Some(expected) = expected {
            let winner_parsed = &parsed[winner.file.name.as_str()];
            let container_confirms =
                container.has_episodes() && !episode_is_wrong(&container, expected);
            if episode_is_wrong(winner_parsed, expected) && !container_confirms {
                metrics::SELECTIONS.with_label_values(&["vetoed"]).inc();
                warn!(
                    download = %download.name,
                    file = %winner.file.name,
                    episodes = ?winner_parsed.episodes,
                    "Best file is the wrong episode, refusing to serve it"
                );
                return None;
            }
        }

        metrics::SELECTIONS.with_label_values(&["selected"]).inc();
        debug!(download = %download.name, file = %winner.file.name, score = winner.score, "Selected file");
        Some(winner.file.clone())
    }

    /// Score every playable file, best first. Ties keep listing order.
    pub fn rank<'a>(
        &self,
        download: &'a CandidateDownload,
        expected: Option<&ExpectedMetadata>,
        options: &SelectOptions,
    ) -> Vec<ScoredCandidate<'a>> {
        let container = self.parser.parse(&download.name);
        let parsed = self.parse_all(&download.files);
        self.rank_parsed(download, &container, &parsed, expected, options)
    }

    /// Parse each distinct filename once.
    fn parse_all<'a>(&self, files: &'a [CandidateFile]) -> HashMap<&'a str, ParsedTitle> {
        let mut parsed = HashMap::with_capacity(files.len());
        for file in files {
            parsed
                .entry(file.name.as_str())
                .or_insert_with(|| self.parser.parse(&file.name));
        }
        parsed
    }

    fn rank_parsed<'a>(
        &self,
        download: &'a CandidateDownload,
        container: &ParsedTitle,
        parsed: &HashMap<&str, ParsedTitle>,
        expected: Option<&ExpectedMetadata>,
        options: &SelectOptions,
    ) -> Vec<ScoredCandidate<'a>> {
        let max_size = download
            .files
            .iter()
            .map(|f| f.size)
            .chain(std::iter::once(download.size))
            .max()
            .unwrap_or(0);
        let ctx = ScoringContext {
            expected,
            options,
            container,
            max_size,
        };

        let mut ranked: Vec<ScoredCandidate<'a>> = download
            .files
            .iter()
            .enumerate()
            .filter(|(_, file)| !media::classify(file).is_excluded())
            .filter_map(|(position, file)| {
                let parsed = parsed.get(file.name.as_str())?;
                let score = ctx.score(file, parsed);
                debug!(file = %file.name, score, "Scored file");
                Some(ScoredCandidate {
                    file,
                    score,
                    position,
                })
            })
            .collect();

        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked
    }
}
