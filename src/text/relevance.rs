//! Conflict relevance scoring.

use std::sync::LazyLock;

use regex::Regex;

/// Conflict lexicon used for keyword hits.
pub const CONFLICT_KEYWORDS: &[&str] = &[
    "military", "strike", "killed", "wounded", "attack", "bombing", "missile",
    "drone", "shelling", "troops", "offensive", "airstrike", "artillery",
    "clashes", "militant", "insurgent", "ceasefire", "invasion", "combat",
    "casualties", "explosion", "gunfire", "mortar", "soldiers", "war",
];

static KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(r"(?i)\b(?:{})\b", CONFLICT_KEYWORDS.join("|"));
    Regex::new(&pattern).expect("keyword pattern compiles")
});

/// Score conflict relevance in [0,1]:
/// `0.7 * min(keyword_hits / 8, 1) + 0.3 * min(len / 1000, 1)`.
///
/// Articles below the configured relevance threshold are dropped before
/// extraction.
pub fn score_relevance(text: &str) -> f64 {
    let hits = KEYWORD_RE.find_iter(text).count() as f64;
    let keyword_component = (hits / 8.0).min(1.0);
    let length_component = (text.len() as f64 / 1000.0).min(1.0);
    0.7 * keyword_component + 0.3 * length_component
}
