//! Lightweight language detection over stopword frequencies.
//!
//! Script ranges decide Cyrillic and Arabic; Latin-script languages are
//! scored by stopword hits. Defaults to `en` whenever the signal is weak.

use std::collections::HashMap;
use std::sync::LazyLock;

static STOPWORDS: LazyLock<HashMap<&'static str, &'static [&'static str]>> =
    LazyLock::new(|| {
        let mut map: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
        map.insert(
            "en",
            &[
                "the", "and", "was", "were", "with", "that", "have", "from", "this", "been",
            ][..],
        );
        map.insert(
            "es",
            &[
                "el", "la", "los", "las", "que", "con", "por", "para", "una", "fueron",
            ][..],
        );
        map.insert(
            "fr",
            &[
                "le", "la", "les", "des", "que", "avec", "pour", "dans", "ont", "une",
            ][..],
        );
        map.insert(
            "de",
            &[
                "der", "die", "das", "und", "mit", "von", "wurden", "ein", "eine", "nicht",
            ][..],
        );
        map
    });

/// Detect the ISO-639-1 language code of a text. Returns `en` on failure.
pub fn detect_language(text: &str) -> String {
    if text.trim().is_empty() {
        return "en".to_string();
    }

    let cyrillic = text.chars().filter(|c| ('\u{0400}'..='\u{04FF}').contains(c)).count();
    let arabic = text.chars().filter(|c| ('\u{0600}'..='\u{06FF}').contains(c)).count();
    let letters = text.chars().filter(|c| c.is_alphabetic()).count().max(1);

    if cyrillic * 2 > letters {
        // Ukrainian-specific letters distinguish uk from ru.
        let uk_markers = text.chars().filter(|c| "іїєґІЇЄҐ".contains(*c)).count();
        return if uk_markers > 0 { "uk" } else { "ru" }.to_string();
    }
    if arabic * 2 > letters {
        return "ar".to_string();
    }

    let tokens: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_alphabetic())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect();

    let mut best = ("en", 0usize);
    for (lang, words) in STOPWORDS.iter() {
        let hits = tokens.iter().filter(|t| words.contains(&t.as_str())).count();
        if hits > best.1 {
            best = (lang, hits);
        }
    }

    // Require a minimum of two stopword hits before trusting the signal.
    if best.1 >= 2 {
        best.0.to_string()
    } else {
        "en".to_string()
    }
}
