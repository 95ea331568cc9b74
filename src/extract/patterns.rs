//! Deterministic pattern fallback for event extraction.
//!
//! Used when the LLM is unconfigured, unreachable, or returns a
//! schema-invalid response. At most one event per article on this path.

use regex::Regex;
use std::sync::LazyLock;

use crate::model::{Article, Casualties, EventType};
use crate::text::entities::{casualty_counts, ExtractedEntities};

static CONFLICT_CUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:killed|wounded|strikes?|attacks?|shelling|bombings?|clashes|offensives?|invasions?|airstrikes?|missiles?|gunfire|explosions?|nuclear)\b")
        .expect("conflict cue pattern compiles")
});

/// Classify the event type from lexical cues.
pub fn classify_event_type(text: &str) -> EventType {
    let lowered = text.to_lowercase();
    if lowered.contains("exercise") || lowered.contains("drill") || lowered.contains("war games") {
        EventType::MilitaryExercise
    } else if lowered.contains("suicide bomb")
        || lowered.contains("terrorist")
        || lowered.contains("car bomb")
    {
        EventType::Terrorism
    } else if lowered.contains("protest")
        || lowered.contains("riot")
        || lowered.contains("demonstrat")
        || lowered.contains("unrest")
    {
        EventType::CivilUnrest
    } else if lowered.contains("ceasefire")
        || lowered.contains("peace talks")
        || lowered.contains("negotiat")
        || lowered.contains("summit")
    {
        EventType::Diplomatic
    } else if lowered.contains("operation")
        || lowered.contains("offensive")
        || lowered.contains("raid")
    {
        EventType::MilitaryOperation
    } else if CONFLICT_CUE_RE.is_match(text) {
        EventType::ArmedConflict
    } else {
        EventType::Other
    }
}

/// Baseline escalation score from casualty counts, before the contractual
/// overrides are applied.
pub fn baseline_escalation(casualties: &Casualties) -> u8 {
    match casualties.killed.unwrap_or(0) {
        0 => {
            if casualties.wounded.unwrap_or(0) > 0 {
                4
            } else {
                3
            }
        }
        1..=9 => 5,
        10..=49 => 6,
        _ => 7,
    }
}

/// A draft event produced by either extraction path; the extractor turns
/// it into a model event.
#[derive(Debug, Clone)]
pub struct DraftEvent {
    pub enhanced_headline: String,
    pub event_type: EventType,
    pub escalation_score: u8,
    pub primary_actors: Vec<String>,
    pub location_hint: Option<String>,
    pub casualties: Casualties,
    pub weapons: Vec<String>,
    /// Verification confidence in [0,1]
    pub confidence: f64,
}

/// Pattern extraction: one event at most, built from the regex entity
/// extraction. Articles without conflict cues yield nothing.
pub fn pattern_extract(article: &Article, entities: &ExtractedEntities) -> Option<DraftEvent> {
    let text = article.text();
    if !CONFLICT_CUE_RE.is_match(&text) {
        return None;
    }

    let event_type = classify_event_type(&text);
    let casualties = casualty_counts(&text);

    let actors: Vec<String> = entities
        .organizations
        .iter()
        .take(3)
        .map(|o| o.text.clone())
        .collect();

    let weapons: Vec<String> = entities.weapons.iter().map(|w| w.text.clone()).collect();

    let location_hint = entities.locations.first().map(|l| l.text.clone());

    let enhanced_headline = match (&actors.first(), &location_hint) {
        (Some(actor), Some(place)) => {
            format!("{}: {} ({})", place, article.headline.trim(), actor)
        }
        (None, Some(place)) => format!("{}: {}", place, article.headline.trim()),
        _ => article.headline.trim().to_string(),
    };

    Some(DraftEvent {
        enhanced_headline,
        event_type,
        escalation_score: baseline_escalation(&casualties),
        primary_actors: actors,
        location_hint,
        casualties,
        weapons,
        confidence: 0.5,
    })
}
