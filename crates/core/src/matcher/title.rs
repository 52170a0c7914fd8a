//! Title normalization and fuzzy comparison.

use serde::{Deserialize, Serialize};

/// Minimum similarity for [`TitleMatchMode::Ratio`].
pub const SIMILARITY_THRESHOLD: f64 = 0.8;

/// How a parsed title is compared with an expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleMatchMode {
    /// Every word of one title appears in the other.
    #[default]
    Contains,
    /// Normalized Levenshtein similarity of at least 0.8.
    Ratio,
}

impl TitleMatchMode {
    /// Compare two titles that went through [`normalize_title`].
    pub fn matches(&self, parsed: &str, expected: &str) -> bool {
        if parsed.is_empty() || expected.is_empty() {
            return false;
        }
        match self {
            TitleMatchMode::Contains => {
                let parsed_words: Vec<&str> = parsed.split(' ').collect();
                let expected_words: Vec<&str> = expected.split(' ').collect();
                expected_words.iter().all(|w| parsed_words.contains(w))
                    || parsed_words.iter().all(|w| expected_words.contains(w))
            }
            TitleMatchMode::Ratio => {
                strsim::normalized_levenshtein(parsed, expected) >= SIMILARITY_THRESHOLD
            }
        }
    }
}

/// Lowercase, spell out `&`, and reduce everything else to single-spaced
/// alphanumeric words.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .replace('&', " and ")
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("Law & Order: SVU"), "law and order svu");
        assert_eq!(normalize_title("  Spider-Man   "), "spider man");
        assert_eq!(normalize_title("Amélie"), "amélie");
    }

    #[test]
    fn test_contains_mode() {
        let mode = TitleMatchMode::Contains;
        assert!(mode.matches("the office us", "the office"));
        assert!(mode.matches("office", "the office"));
        assert!(!mode.matches("parks and recreation", "the office"));
        assert!(!mode.matches("", "the office"));
    }

    #[test]
    fn test_ratio_mode() {
        let mode = TitleMatchMode::Ratio;
        assert!(mode.matches("rachmaninov concerto", "rahmaninov concerto"));
        assert!(!mode.matches("the office", "the officer and the gentleman"));
    }
}
