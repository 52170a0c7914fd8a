//! Regex parser for scene and fansub release names.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex_lite::{Captures, Regex};

use super::{ParsedTitle, TitleParser};

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

static EXTENSION: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)\.(mkv|mp4|avi|m4v|mov|wmv|flv|webm|ts|m2ts|mpe?g|iso|vob|srt|ass|ssa|sub|idx|nfo|txt|rar|zip|7z|jpe?g|png|gif|pdf)$",
    )
});
static LEADING_GROUP: Lazy<Regex> = Lazy::new(|| compile(r"^\s*\[[^\]]*\]\s*"));
static SEASON_EPISODE: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)\bS(\d{1,2})\s?E(\d{1,4})((?:\s?-\s?E?\d{1,4}\b|\s?E\d{1,4}\b)*)")
});
static CROSS: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\b(\d{1,2})x(\d{1,3})\b"));
static SEASON_RANGE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bS(\d{1,2})\s?-\s?S?(\d{1,2})\b"));
static SEASON_WORD: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)\bSeasons?\s?(\d{1,2})(?:\s?(?:-|to|&)\s?(\d{1,2}))?\b")
});
static SEASON_ONLY: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bS(\d{1,2})\b"));
static EPISODE_WORD: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\b(?:Episode|Ep)\s?(\d{1,4})\b"));
static DASH_EPISODE: Lazy<Regex> = Lazy::new(|| compile(r"\s-\s(\d{1,4})(?:v\d)?\b"));
static YEAR: Lazy<Regex> = Lazy::new(|| compile(r"\b(19\d{2}|20\d{2})\b"));
static RESOLUTION: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)\b(2160p|1440p|1080p|720p|576p|480p|360p|4k)\b"));
static QUALITY: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)\b(blu-?ray|web-?dl|web-?rip|hdtv|dvdrip|bdrip|brrip|hdrip|remux|x26[45]|h26[45]|hevc|xvid|proper|repack)\b",
    )
});
static DIGITS: Lazy<Regex> = Lazy::new(|| compile(r"\d+"));

/// Widest range accepted when expanding `E01-E24` style markers.
const MAX_RANGE: u32 = 100;

fn number(caps: &Captures<'_>, group: usize) -> Option<u32> {
    caps.get(group)?.as_str().parse().ok()
}

fn expand(first: u32, last: u32) -> Vec<u32> {
    if last >= first && last - first <= MAX_RANGE {
        (first..=last).collect()
    } else {
        vec![first]
    }
}

fn basename(raw: &str) -> &str {
    raw.rsplit(['/', '\\']).next().unwrap_or(raw)
}

/// Parser for `Show.Name.S01E02.1080p.WEB-DL-GROUP` style names.
///
/// Understands `S01E02`, `S01E01-E03`, `1x05`, `Season 1`, `S01-S03`,
/// `Episode 5`, fansub ` - 05`, years and resolution/source tags. The title
/// is whatever precedes the first marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct SceneTitleParser;

impl SceneTitleParser {
    pub fn new() -> Self {
        Self
    }
}

/// Tracks where the title ends.
struct Cut(usize);

impl Cut {
    fn at(&mut self, pos: usize) {
        self.0 = self.0.min(pos);
    }
}

impl TitleParser for SceneTitleParser {
    fn parse(&self, raw: &str) -> ParsedTitle {
        let name = basename(raw);
        let name = EXTENSION.replace(name, "");
        let name = name.replace(['.', '_'], " ");
        let name: Cow<'_, str> = LEADING_GROUP.replace(&name, "");
        let name: &str = &name;

        let mut cut = Cut(name.len());
        let mut seasons = Vec::new();
        let mut episodes = Vec::new();

        if let Some(caps) = SEASON_EPISODE.captures(name) {
            if let (Some(m), Some(season), Some(first)) =
                (caps.get(0), number(&caps, 1), number(&caps, 2))
            {
                cut.at(m.start());
                seasons.push(season);

                let rest = caps.get(3).map(|r| r.as_str()).unwrap_or_default();
                let more: Vec<u32> = DIGITS
                    .find_iter(rest)
                    .filter_map(|d| d.as_str().parse().ok())
                    .collect();
                match more.last() {
                    Some(&last) if rest.contains('-') => episodes = expand(first, last),
                    _ => {
                        episodes.push(first);
                        episodes.extend(more);
                    }
                }
            }
        } else if let Some(caps) = CROSS.captures(name) {
            if let (Some(m), Some(season), Some(episode)) =
                (caps.get(0), number(&caps, 1), number(&caps, 2))
            {
                cut.at(m.start());
                seasons.push(season);
                episodes.push(episode);
            }
        }

        if seasons.is_empty() {
            if let Some(caps) = SEASON_RANGE.captures(name) {
                if let (Some(m), Some(first), Some(last)) =
                    (caps.get(0), number(&caps, 1), number(&caps, 2))
                {
                    cut.at(m.start());
                    seasons = expand(first, last);
                }
            } else if let Some(caps) = SEASON_WORD.captures(name) {
                if let (Some(m), Some(first)) = (caps.get(0), number(&caps, 1)) {
                    cut.at(m.start());
                    seasons = match number(&caps, 2) {
                        Some(last) => expand(first, last),
                        None => vec![first],
                    };
                }
            } else if let Some(caps) = SEASON_ONLY.captures(name) {
                if let (Some(m), Some(season)) = (caps.get(0), number(&caps, 1)) {
                    cut.at(m.start());
                    seasons.push(season);
                }
            }
        }

        if episodes.is_empty() {
            if let Some(caps) = EPISODE_WORD.captures(name) {
                if let (Some(m), Some(episode)) = (caps.get(0), number(&caps, 1)) {
                    cut.at(m.start());
                    episodes.push(episode);
                }
            } else if let Some(caps) = DASH_EPISODE.captures(name) {
                let looks_like_year = caps
                    .get(1)
                    .is_some_and(|d| d.as_str().len() == 4 && YEAR.is_match(d.as_str()));
                if let (false, Some(m), Some(episode)) =
                    (looks_like_year, caps.get(0), number(&caps, 1))
                {
                    cut.at(m.start());
                    episodes.push(episode);
                }
            }
        }

        // The last year wins; a leading year is only a year if nothing else is.
        let years: Vec<_> = YEAR.find_iter(name).collect();
        let year = match years.as_slice() {
            [] => None,
            [only] => {
                if only.start() > 0 {
                    cut.at(only.start());
                }
                only.as_str().parse().ok()
            }
            [.., last] => {
                cut.at(last.start());
                last.as_str().parse().ok()
            }
        };

        let resolution = RESOLUTION.find(name).map(|m| {
            cut.at(m.start());
            m.as_str().to_lowercase()
        });
        if let Some(m) = QUALITY.find(name) {
            cut.at(m.start());
        }
        if let Some(pos) = name.find('[') {
            cut.at(pos);
        }

        let title = name[..cut.0]
            .trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '(' | '['))
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        ParsedTitle {
            title: (!title.is_empty()).then_some(title),
            seasons,
            episodes,
            year,
            resolution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> ParsedTitle {
        SceneTitleParser::new().parse(raw)
    }

    #[test]
    fn test_scene_episode() {
        let parsed = parse("Show.Name.S01E02.1080p.WEB-DL.x264-GROUP.mkv");
        assert_eq!(parsed.title.as_deref(), Some("Show Name"));
        assert_eq!(parsed.seasons, vec![1]);
        assert_eq!(parsed.episodes, vec![2]);
        assert_eq!(parsed.resolution.as_deref(), Some("1080p"));
        assert_eq!(parsed.year, None);
    }

    #[test]
    fn test_episode_ranges() {
        assert_eq!(parse("Show.S01E01-E03.720p.mkv").episodes, vec![1, 2, 3]);
        assert_eq!(parse("Show.S01E01-03.720p.mkv").episodes, vec![1, 2, 3]);
        assert_eq!(parse("Show.S02E05E06.mkv").episodes, vec![5, 6]);
    }

    #[test]
    fn test_cross_notation() {
        let parsed = parse("show 1x05 hdtv.avi");
        assert_eq!(parsed.title.as_deref(), Some("show"));
        assert_eq!(parsed.seasons, vec![1]);
        assert_eq!(parsed.episodes, vec![5]);
    }

    #[test]
    fn test_season_packs() {
        let parsed = parse("Show Season 1 1080p");
        assert_eq!(parsed.title.as_deref(), Some("Show"));
        assert_eq!(parsed.seasons, vec![1]);
        assert!(parsed.episodes.is_empty());

        assert_eq!(parse("Show.S01-S03.1080p.BluRay").seasons, vec![1, 2, 3]);
        assert_eq!(parse("Show S02 720p").seasons, vec![2]);
    }

    #[test]
    fn test_fansub_absolute_episode() {
        let parsed = parse("[SubsPlease] Frieren - 05 (1080p) [ABCDEF12].mkv");
        assert_eq!(parsed.title.as_deref(), Some("Frieren"));
        assert!(parsed.seasons.is_empty());
        assert_eq!(parsed.episodes, vec![5]);
        assert_eq!(parsed.resolution.as_deref(), Some("1080p"));

        assert_eq!(parse("Show Episode 12").episodes, vec![12]);
    }

    #[test]
    fn test_movie_years() {
        let parsed = parse("Movie.2020.1080p.sample.mkv");
        assert_eq!(parsed.title.as_deref(), Some("Movie"));
        assert_eq!(parsed.year, Some(2020));

        let parsed = parse("Blade.Runner.2049.2017.2160p.mkv");
        assert_eq!(parsed.title.as_deref(), Some("Blade Runner 2049"));
        assert_eq!(parsed.year, Some(2017));

        let parsed = parse("Movie (2019) [1080p]");
        assert_eq!(parsed.title.as_deref(), Some("Movie"));
        assert_eq!(parsed.year, Some(2019));
    }

    #[test]
    fn test_uses_basename_only() {
        let parsed = parse("Show/Season 1/Show.S01E03.mkv");
        assert_eq!(parsed.seasons, vec![1]);
        assert_eq!(parsed.episodes, vec![3]);
        assert_eq!(parsed.title.as_deref(), Some("Show"));
    }

    #[test]
    fn test_bare_title() {
        let parsed = parse("Some Documentary.mkv");
        assert_eq!(parsed.title.as_deref(), Some("Some Documentary"));
        assert!(!parsed.has_seasons());
        assert!(!parsed.has_episodes());
    }
}
