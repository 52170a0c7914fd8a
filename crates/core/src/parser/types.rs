use serde::{Deserialize, Serialize};

/// Structured metadata extracted from a release or file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTitle {
    /// Title text preceding the first recognised marker.
    pub title: Option<String>,
    /// Seasons mentioned (ranges expanded).
    pub seasons: Vec<u32>,
    /// Episodes mentioned (ranges expanded).
    pub episodes: Vec<u32>,
    /// Release year.
    pub year: Option<u32>,
    /// Resolution marker such as `1080p`.
    pub resolution: Option<String>,
}

impl ParsedTitle {
    pub fn has_seasons(&self) -> bool {
        !self.seasons.is_empty()
    }

    pub fn has_episodes(&self) -> bool {
        !self.episodes.is_empty()
    }
}

/// Turns a raw filename or release name into [`ParsedTitle`].
///
/// Implementations are pure; callers memoize results per name.
pub trait TitleParser: Send + Sync {
    fn parse(&self, raw: &str) -> ParsedTitle;
}
