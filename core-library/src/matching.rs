//! # Normalization & Identity Matching
//!
//! Remote services never agree on how a track is spelled: one appends
//! "(2009 Remaster)", another prefixes "The", a third calls it a "Single
//! Version". This module reduces titles and artist names to a comparable
//! form and scores how closely two tracks match.
//!
//! ## Ladder
//!
//! Every comparison lands on the first rung that holds:
//!
//! | Rung | Condition |
//! |------|-----------|
//! | exact | case-insensitive, trimmed equality |
//! | normalized | normalized forms are equal |
//! | prefix | one normalized form starts with the other |
//! | substring | one normalized form contains the other |
//! | none | anything else, or either side empty |
//!
//! Each scoring function maps the rungs to its own weights; see
//! [`get_match_score`], [`get_album_match_score`] and
//! [`get_artist_match_score`].

use once_cell::sync::Lazy;
use regex::Regex;

/// Minimum score for an existing local entry to count as the track a remote
/// removal refers to.
pub const REMOVAL_MATCH_THRESHOLD: u32 = 20;

static YEAR_VARIANT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d{4}\s+(?:remaster(?:ed)?|(?:re)?mix)\b")
        .expect("year variant pattern compiles")
});

const TITLE_STOP_WORDS: &[&str] = &[
    "edition", "deluxe", "special", "version", "album", "single", "remix", "mono", "stereo",
    "mix",
];

const ARTIST_STOP_WORDS: &[&str] = &["the"];

fn strip_token(token: &str) -> &str {
    token.trim_matches(|c| matches!(c, '-' | '(' | ')' | '[' | ']'))
}

/// Normalize a track title for comparison.
///
/// Lower-cases, drops "<year> remaster(ed)" and "<year> (re)mix" phrases,
/// strips bracket and dash decoration from every token and removes edition
/// words. If nothing survives, the original input is returned unchanged.
///
/// ```
/// use core_library::matching::normalize_title;
///
/// assert_eq!(normalize_title("Hey Jude (2009 Remaster)"), "hey jude");
/// assert_eq!(normalize_title("Edition Deluxe Special Version"), "Edition Deluxe Special Version");
/// ```
pub fn normalize_title(title: &str) -> String {
    let lowered = title.trim().to_lowercase();
    let without_variants = YEAR_VARIANT.replace_all(&lowered, " ");

    let tokens: Vec<&str> = without_variants
        .split_whitespace()
        .map(strip_token)
        .filter(|token| !token.is_empty())
        .filter(|token| !token.starts_with("remaster"))
        .filter(|token| !TITLE_STOP_WORDS.contains(token))
        .collect();

    if tokens.is_empty() {
        title.to_string()
    } else {
        tokens.join(" ")
    }
}

/// Normalize an artist name for comparison. Drops a standalone "the".
///
/// ```
/// use core_library::matching::normalize_artist;
///
/// assert_eq!(normalize_artist("The Beatles"), "beatles");
/// assert_eq!(normalize_artist("The"), "The");
/// ```
pub fn normalize_artist(artist: &str) -> String {
    let lowered = artist.trim().to_lowercase();

    let tokens: Vec<&str> = lowered
        .split_whitespace()
        .map(strip_token)
        .filter(|token| !token.is_empty())
        .filter(|token| !ARTIST_STOP_WORDS.contains(token))
        .collect();

    if tokens.is_empty() {
        artist.to_string()
    } else {
        tokens.join(" ")
    }
}

/// Rung of the match ladder, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    Exact,
    Normalized,
    Prefix,
    Substring,
    None,
}

impl MatchTier {
    /// Compare two strings under the given normalizer.
    pub fn compare(a: &str, b: &str, normalize: fn(&str) -> String) -> MatchTier {
        let (a_trimmed, b_trimmed) = (a.trim(), b.trim());
        if a_trimmed.is_empty() || b_trimmed.is_empty() {
            return MatchTier::None;
        }

        if a_trimmed.to_lowercase() == b_trimmed.to_lowercase() {
            return MatchTier::Exact;
        }

        let a_norm = normalize(a).to_lowercase();
        let b_norm = normalize(b).to_lowercase();

        if a_norm == b_norm {
            MatchTier::Normalized
        } else if a_norm.starts_with(&b_norm) || b_norm.starts_with(&a_norm) {
            MatchTier::Prefix
        } else if a_norm.contains(&b_norm) || b_norm.contains(&a_norm) {
            MatchTier::Substring
        } else {
            MatchTier::None
        }
    }

    /// Pick the weight for this rung from `[exact, normalized, prefix, substring]`.
    fn weight(self, weights: [u32; 4]) -> u32 {
        match self {
            MatchTier::Exact => weights[0],
            MatchTier::Normalized => weights[1],
            MatchTier::Prefix => weights[2],
            MatchTier::Substring => weights[3],
            MatchTier::None => 0,
        }
    }
}

const TITLE_WEIGHTS: [u32; 4] = [50, 40, 30, 20];
const TRACK_ARTIST_WEIGHTS: [u32; 4] = [30, 20, 15, 10];
const ALBUM_ARTIST_WEIGHTS: [u32; 4] = [20, 15, 10, 5];
const ARTIST_WEIGHTS: [u32; 4] = [50, 40, 30, 20];

/// Anything with an artist and a title can be scored.
pub trait Matchable {
    fn match_artist(&self) -> &str;
    fn match_title(&self) -> &str;
}

impl Matchable for (&str, &str) {
    fn match_artist(&self) -> &str {
        self.0
    }

    fn match_title(&self) -> &str {
        self.1
    }
}

fn title_tier(a: &impl Matchable, b: &impl Matchable) -> MatchTier {
    MatchTier::compare(a.match_title(), b.match_title(), normalize_title)
}

fn artist_tier(a: &impl Matchable, b: &impl Matchable) -> MatchTier {
    MatchTier::compare(a.match_artist(), b.match_artist(), normalize_artist)
}

/// Track similarity: title 50/40/30/20 plus artist 30/20/15/10 (max 80).
///
/// ```
/// use core_library::matching::get_match_score;
///
/// let score = get_match_score(&("The Beatles", "Hey Jude"), &("Beatles", "Hey Jude (2009 Remaster)"));
/// assert_eq!(score, 60);
/// ```
pub fn get_match_score(a: &impl Matchable, b: &impl Matchable) -> u32 {
    title_tier(a, b).weight(TITLE_WEIGHTS) + artist_tier(a, b).weight(TRACK_ARTIST_WEIGHTS)
}

/// Album similarity, where `match_title` is the album title: title
/// 50/40/30/20 plus artist 20/15/10/5 (max 70).
pub fn get_album_match_score(a: &impl Matchable, b: &impl Matchable) -> u32 {
    title_tier(a, b).weight(TITLE_WEIGHTS) + artist_tier(a, b).weight(ALBUM_ARTIST_WEIGHTS)
}

/// Artist similarity: 50/40/30/20 (max 50).
pub fn get_artist_match_score(a: &str, b: &str) -> u32 {
    MatchTier::compare(a, b, normalize_artist).weight(ARTIST_WEIGHTS)
}

/// Highest scoring candidate, first one on ties. No minimum score.
pub fn best_match<'a, T: Matchable>(
    target: &impl Matchable,
    candidates: &'a [T],
) -> Option<(&'a T, u32)> {
    candidates
        .iter()
        .map(|candidate| (candidate, get_match_score(target, candidate)))
        .fold(None, |best, (candidate, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((candidate, score)),
        })
}
