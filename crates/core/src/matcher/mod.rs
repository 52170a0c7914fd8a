//! Metadata predicates.
//!
//! Each predicate answers "does this parsed name contradict what the caller
//! expects?". Missing data on either side never counts as a contradiction.

mod title;

use serde::{Deserialize, Serialize};

use crate::parser::ParsedTitle;

pub use title::{normalize_title, TitleMatchMode, SIMILARITY_THRESHOLD};

/// What the caller is looking for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedMetadata {
    /// Acceptable titles (aliases).
    #[serde(default)]
    pub titles: Vec<String>,
    pub year: Option<u32>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// Episode number counted across seasons.
    pub absolute_episode: Option<u32>,
}

impl ExpectedMetadata {
    /// A target episode was requested, by season numbering or absolute.
    pub fn wants_episode(&self) -> bool {
        self.episode.is_some() || self.absolute_episode.is_some()
    }

    /// Season, episode and absolute episode are all known.
    pub fn fully_numbered(&self) -> bool {
        self.season.is_some() && self.episode.is_some() && self.absolute_episode.is_some()
    }
}

/// The parsed seasons exclude the expected season.
///
/// A lone season `1` is tolerated when the parsed episodes contain the
/// expected absolute episode: season-less numbering often reads as season 1.
pub fn season_is_wrong(parsed: &ParsedTitle, expected: &ExpectedMetadata) -> bool {
    let Some(season) = expected.season else {
        return false;
    };
    if parsed.seasons.is_empty() || parsed.seasons.contains(&season) {
        return false;
    }
    if parsed.seasons == [1] {
        if let Some(absolute) = expected.absolute_episode {
            if parsed.episodes.contains(&absolute) {
                return false;
            }
        }
    }
    true
}

/// The parsed episodes contain neither the expected episode nor the
/// expected absolute episode.
pub fn episode_is_wrong(parsed: &ParsedTitle, expected: &ExpectedMetadata) -> bool {
    if parsed.episodes.is_empty() || !expected.wants_episode() {
        return false;
    }
    ![expected.episode, expected.absolute_episode]
        .into_iter()
        .flatten()
        .any(|e| parsed.episodes.contains(&e))
}

/// The parsed title matches none of the expected titles.
pub fn title_is_wrong(
    parsed: &ParsedTitle,
    expected: &ExpectedMetadata,
    mode: TitleMatchMode,
) -> bool {
    let Some(title) = parsed.title.as_deref() else {
        return false;
    };
    if expected.titles.is_empty() {
        return false;
    }
    let title = normalize_title(title);
    !expected
        .titles
        .iter()
        .any(|t| mode.matches(&title, &normalize_title(t)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(seasons: &[u32], episodes: &[u32]) -> ParsedTitle {
        ParsedTitle {
            title: Some("Show".to_string()),
            seasons: seasons.to_vec(),
            episodes: episodes.to_vec(),
            ..Default::default()
        }
    }

    fn expect(season: Option<u32>, episode: Option<u32>, absolute: Option<u32>) -> ExpectedMetadata {
        ExpectedMetadata {
            titles: vec!["Show".to_string()],
            season,
            episode,
            absolute_episode: absolute,
            ..Default::default()
        }
    }

    #[test]
    fn test_season_is_wrong() {
        assert!(season_is_wrong(&parsed(&[1], &[5]), &expect(Some(2), Some(5), None)));
        assert!(!season_is_wrong(&parsed(&[2], &[5]), &expect(Some(2), Some(5), None)));
        assert!(!season_is_wrong(&parsed(&[1, 2, 3], &[]), &expect(Some(2), None, None)));
    }

    #[test]
    fn test_season_missing_is_not_wrong() {
        assert!(!season_is_wrong(&parsed(&[], &[5]), &expect(Some(2), Some(5), None)));
        assert!(!season_is_wrong(&parsed(&[4], &[5]), &expect(None, Some(5), None)));
    }

    #[test]
    fn test_season_one_with_absolute_episode() {
        // "Show S01E30" for what is really season 2 episode 5 (absolute 30)
        let expected = expect(Some(2), Some(5), Some(30));
        assert!(!season_is_wrong(&parsed(&[1], &[30]), &expected));
        assert!(season_is_wrong(&parsed(&[1], &[5]), &expected));
        assert!(season_is_wrong(&parsed(&[1, 3], &[30]), &expected));
    }

    #[test]
    fn test_episode_is_wrong() {
        assert!(episode_is_wrong(&parsed(&[1], &[4]), &expect(Some(1), Some(5), None)));
        assert!(!episode_is_wrong(&parsed(&[1], &[4, 5, 6]), &expect(Some(1), Some(5), None)));
        assert!(!episode_is_wrong(&parsed(&[], &[30]), &expect(Some(2), Some(5), Some(30))));
        assert!(!episode_is_wrong(&parsed(&[1], &[]), &expect(Some(1), Some(5), None)));
        assert!(!episode_is_wrong(&parsed(&[1], &[4]), &expect(Some(1), None, None)));
    }

    #[test]
    fn test_title_is_wrong() {
        let expected = ExpectedMetadata {
            titles: vec!["The Office".to_string(), "The Office (US)".to_string()],
            ..Default::default()
        };
        let mut p = ParsedTitle {
            title: Some("The.Office.US".to_string()),
            ..Default::default()
        };
        assert!(!title_is_wrong(&p, &expected, TitleMatchMode::Contains));

        p.title = Some("Parks and Recreation".to_string());
        assert!(title_is_wrong(&p, &expected, TitleMatchMode::Contains));
        assert!(title_is_wrong(&p, &expected, TitleMatchMode::Ratio));

        p.title = None;
        assert!(!title_is_wrong(&p, &expected, TitleMatchMode::Contains));
        assert!(!title_is_wrong(
            &ParsedTitle::default(),
            &ExpectedMetadata::default(),
            TitleMatchMode::Ratio
        ));
    }
}
