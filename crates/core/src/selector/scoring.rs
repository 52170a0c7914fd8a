//! Weighted scoring of candidate files.
//!
//! A score is the sum of `weight * strength` over [`WEIGHTS`], where each
//! signal's strength lies in `0.0..=1.0`. The weights encode the ranking:
//! being a video outweighs season/episode agreement, which outweighs the
//! title, which outweighs size, which outweighs the caller's hints.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::{media, SelectOptions};
use crate::gateway::CandidateFile;
use crate::matcher::{episode_is_wrong, season_is_wrong, title_is_wrong, ExpectedMetadata};
use crate::parser::ParsedTitle;

/// One independent piece of evidence about a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    VideoFile,
    SampleLike,
    YearMatch,
    SeasonConsistent,
    SeasonMissing,
    EpisodeConsistent,
    EpisodeMissing,
    TitleMatch,
    RelativeSize,
    IndexHint,
    FilenameHint,
}

/// Signal weights, strongest first.
pub const WEIGHTS: &[(Signal, f64)] = &[
    (Signal::VideoFile, 1000.0),
    (Signal::SampleLike, -500.0),
    (Signal::YearMatch, 500.0),
    (Signal::SeasonConsistent, 500.0),
    (Signal::SeasonMissing, -500.0),
    (Signal::EpisodeConsistent, 500.0),
    (Signal::EpisodeMissing, -500.0),
    (Signal::TitleMatch, 100.0),
    (Signal::RelativeSize, 50.0),
    (Signal::IndexHint, 25.0),
    (Signal::FilenameHint, 25.0),
];

const SAMPLE_MARKERS: &[&str] = &["sample", "trailer", "preview"];

static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]|\{[^}]*\}").unwrap());
static SITE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*www[\s.][a-z0-9-]+[\s.][a-z]{2,4}\b[\s\-_.]*",
    )
    .unwrap()
});

/// Strip tags that releases add to both the container and its files
/// (bracketed group tags, tracker site prefixes) before title comparison.
pub fn preprocess_title(title: &str) -> String {
    let title = BRACKETED.replace_all(title, " ");
    let title = SITE_PREFIX.replace(&title, "");
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Everything about the selection pass that is shared by all files.
pub struct ScoringContext<'a> {
    pub expected: Option<&'a ExpectedMetadata>,
    pub options: &'a SelectOptions,
    /// Parsed name of the download itself.
    pub container: &'a ParsedTitle,
    /// Largest of the declared download size and every file size.
    pub max_size: u64,
}

impl ScoringContext<'_> {
    fn strength(&self, signal: Signal, file: &CandidateFile, parsed: &ParsedTitle) -> f64 {
        let hit = |b: bool| if b { 1.0 } else { 0.0 };

        match signal {
            Signal::VideoFile => hit(media::is_video(file)),
            Signal::SampleLike => {
                let name = file.name.to_lowercase();
                hit(SAMPLE_MARKERS.iter().any(|m| name.contains(m)))
            }
            Signal::RelativeSize => {
                if self.max_size == 0 {
                    0.0
                } else {
                    (file.size as f64 / self.max_size as f64).min(1.0)
                }
            }
            Signal::IndexHint => hit(self.options.preferred_index.is_some()
                && self.options.preferred_index == file.index),
            Signal::FilenameHint => hit(self
                .options
                .preferred_filename
                .as_deref()
                .is_some_and(|hint| !hint.is_empty() && file.name.contains(hint))),
            _ => match self.expected {
                Some(expected) => hit(self.expected_signal(signal, expected, parsed)),
                None => 0.0,
            },
        }
    }

    fn expected_signal(&self, signal: Signal, expected: &ExpectedMetadata, parsed: &ParsedTitle) -> bool {
        match signal {
            Signal::YearMatch => {
                !expected.fully_numbered()
                    && expected.year.is_some()
                    && parsed.year.or(self.container.year) == expected.year
            }
            Signal::SeasonConsistent => !season_is_wrong(parsed, expected),
            Signal::SeasonMissing => expected.season.is_some() && !parsed.has_seasons(),
            Signal::EpisodeConsistent => !episode_is_wrong(parsed, expected),
            Signal::EpisodeMissing => expected.wants_episode() && !parsed.has_episodes(),
            Signal::TitleMatch => {
                let title = parsed
                    .title
                    .as_deref()
                    .or(self.container.title.as_deref())
                    .map(preprocess_title)
                    .filter(|t| !t.is_empty());
                match title {
                    Some(title) if !expected.titles.is_empty() => {
                        let candidate = ParsedTitle {
                            title: Some(title),
                            ..Default::default()
                        };
                        !title_is_wrong(&candidate, expected, self.options.title_match)
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// Total score, floored at zero.
    pub fn score(&self, file: &CandidateFile, parsed: &ParsedTitle) -> f64 {
        WEIGHTS
            .iter()
            .map(|(signal, weight)| weight * self.strength(*signal, file, parsed))
            .sum::<f64>()
            .max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{SceneTitleParser, TitleParser};

    #[test]
    fn test_weights_preserve_signal_ordering() {
        let weight = |s: Signal| {
            WEIGHTS
                .iter()
                .find(|(signal, _)| *signal == s)
                .map(|(_, w)| w.abs())
                .unwrap()
        };
        assert!(weight(Signal::VideoFile) > weight(Signal::SeasonConsistent));
        assert!(weight(Signal::EpisodeConsistent) > weight(Signal::TitleMatch));
        assert!(weight(Signal::TitleMatch) > weight(Signal::RelativeSize));
        assert!(weight(Signal::RelativeSize) > weight(Signal::IndexHint));
        assert!(weight(Signal::RelativeSize) > weight(Signal::FilenameHint));
    }

    #[test]
    fn test_preprocess_title() {
        assert_eq!(preprocess_title("www.Site.com - Show Name"), "Show Name");
        assert_eq!(preprocess_title("www Site com - Show Name"), "Show Name");
        assert_eq!(preprocess_title("Show [Dual Audio] Name"), "Show Name");
        assert_eq!(preprocess_title("Show Name"), "Show Name");
        assert_eq!(preprocess_title("Show To Love"), "Show To Love");
    }

    #[test]
    fn test_score_floor_is_zero() {
        let parser = SceneTitleParser::new();
        let container = parser.parse("Show.S01");
        let expected = ExpectedMetadata {
            season: Some(2),
            episode: Some(5),
            ..Default::default()
        };
        let options = SelectOptions::default();
        let ctx = ScoringContext {
            expected: Some(&expected),
            options: &options,
            container: &container,
            max_size: 100,
        };

        // Not a video, a sample, with neither season nor episode
        let file = CandidateFile::new("sample", 0);
        assert_eq!(ctx.score(&file, &parser.parse(&file.name)), 0.0);
    }

    #[test]
    fn test_hints_add_small_bonus() {
        let parser = SceneTitleParser::new();
        let container = parser.parse("Movie.2020");
        let options = SelectOptions {
            preferred_index: Some(3),
            preferred_filename: Some("Movie.2020.mkv".to_string()),
            ..Default::default()
        };
        let ctx = ScoringContext {
            expected: None,
            options: &options,
            container: &container,
            max_size: 100,
        };

        let hinted = CandidateFile::new("Movie.2020.mkv", 100).with_index(3);
        let plain = CandidateFile::new("Other.2020.mkv", 100).with_index(4);
        let hinted_score = ctx.score(&hinted, &parser.parse(&hinted.name));
        let plain_score = ctx.score(&plain, &parser.parse(&plain.name));
        assert_eq!(hinted_score - plain_score, 50.0);
    }

    #[test]
    fn test_filename_hint_matches_file_name_not_container() {
        let parser = SceneTitleParser::new();
        let container = parser.parse("Show.S01.1080p");
        let options = SelectOptions {
            preferred_filename: Some("Show.S01".to_string()),
            ..Default::default()
        };
        let ctx = ScoringContext {
            expected: None,
            options: &options,
            container: &container,
            max_size: 100,
        };

        let renamed = CandidateFile::new("episode01.mkv", 100);
        let named = CandidateFile::new("Show.S01E02.mkv", 100);
        let renamed_score = ctx.score(&renamed, &parser.parse(&renamed.name));
        let named_score = ctx.score(&named, &parser.parse(&named.name));
        assert_eq!(named_score - renamed_score, 25.0);
    }
}
