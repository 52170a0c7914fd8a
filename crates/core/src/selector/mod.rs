//! File selection inside multi-file downloads.
//!
//! Every candidate is scored against the expected metadata (see
//! [`scoring::WEIGHTS`]), the best one wins, and a final check refuses to
//! serve a file whose episode contradicts the request.

mod media;
pub mod scoring;
mod select;

use serde::{Deserialize, Serialize};

use crate::gateway::CandidateFile;
use crate::matcher::TitleMatchMode;

pub use media::{classify, is_video, FileKind};
pub use select::FileSelector;

/// Caller-tunable knobs for a selection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOptions {
    #[serde(default)]
    pub title_match: TitleMatchMode,
    /// Index chosen last time for this content.
    #[serde(default)]
    pub preferred_index: Option<i64>,
    /// Filename chosen last time for this content.
    ///
    /// Matched as a plain substring of each candidate file's own name, not of
    /// the container title, so it only breaks ties between files of one
    /// download.
    #[serde(default)]
    pub preferred_filename: Option<String>,
}

/// A file with its score, alive for one selection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate<'a> {
    pub file: &'a CandidateFile,
    pub score: f64,
    /// Position in the download's file list.
    pub position: usize,
}
