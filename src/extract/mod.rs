//! Event extraction: LLM path with deterministic fallback.
//!
//! The LLM is a suggester, never an authority. Its output is
//! schema-validated, clamped by the severity overrides below, and replaced
//! wholesale by regex extraction when it misbehaves.

pub mod llm;
pub mod patterns;

use chrono::DateTime;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::llm::{CompletionRequest, LlmClient};
use crate::model::{Article, Casualties, Event, EventType, Severity, TimestampConfidence};
use crate::text::entities::ExtractedEntities;
use crate::text::parse_temporal;

pub use llm::{build_prompt, parse_response, LlmEvent, LlmExtraction};
pub use patterns::{baseline_escalation, classify_event_type, pattern_extract, DraftEvent};

/// CBRN-class weapon terms; any intersection forces minimum escalation 8.
pub const CBRN_WEAPONS: &[&str] = &[
    "nuclear", "chemical", "biological", "radiological", "sarin", "vx", "chlorine",
    "mustard gas", "dirty bomb",
];

/// Killed count at or above which escalation is floored at 7.
const MASS_CASUALTY_KILLED: u32 = 100;

/// Whether a weapon surface form names a CBRN-class weapon.
pub fn is_cbrn(weapon: &str) -> bool {
    let lowered = weapon.to_lowercase();
    CBRN_WEAPONS.iter().any(|term| lowered.contains(term))
}

/// Contractual severity overrides. Scores are clamped upward, never
/// downward: CBRN weapons force escalation >= 8, mass casualties force
/// escalation >= 7.
pub fn apply_overrides(event: &mut Event) {
    if event.weapon_types.iter().any(|w| is_cbrn(w)) {
        event.raise_escalation_to(8);
    }
    if event.casualties.killed.unwrap_or(0) >= MASS_CASUALTY_KILLED {
        event.raise_escalation_to(7);
    }
}

/// An extracted event plus the location hint the georesolver needs.
#[derive(Debug, Clone)]
pub struct ExtractedEvent {
    pub event: Event,
    pub location_hint: Option<String>,
}

/// Turns annotated articles into structured event drafts.
#[derive(Default)]
pub struct EventExtractor {
    llm: Option<Arc<dyn LlmClient>>,
}

impl EventExtractor {
    /// Pattern-only extractor.
    pub fn new() -> Self {
        Self { llm: None }
    }

    /// Extractor with the LLM primary path enabled.
    pub fn with_llm(client: Arc<dyn LlmClient>) -> Self {
        Self { llm: Some(client) }
    }

    /// Extract zero or more events from one article. Errors never leave
    /// this method: LLM failures degrade to the pattern path, and a
    /// pattern miss yields an empty vec.
    pub async fn extract(
        &self,
        article: &Article,
        entities: &ExtractedEntities,
    ) -> Vec<ExtractedEvent> {
        if let Some(client) = &self.llm {
            let request = CompletionRequest::new(llm::build_prompt(article))
                .with_max_tokens(2048)
                .with_temperature(0.0);

            let parsed = match client.complete(request).await {
                Ok(completion) => llm::parse_response(&completion.content),
                Err(err) => Err(err),
            };

            match parsed {
                Ok(extraction) => {
                    if !extraction.is_conflict {
                        return Vec::new();
                    }
                    return extraction
                        .events
                        .into_iter()
                        .map(|e| self.from_llm_event(article, e))
                        .collect();
                }
                Err(err) => {
                    tracing::debug!(
                        article = %article.content_hash,
                        "LLM extraction failed, using pattern fallback: {}",
                        err
                    );
                }
            }
        }

        patterns::pattern_extract(article, entities)
            .map(|draft| Self::from_draft(article, draft))
            .into_iter()
            .collect()
    }

    fn from_llm_event(&self, article: &Article, raw: LlmEvent) -> ExtractedEvent {
        let (timestamp, timestamp_confidence) = match raw
            .timestamp
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        {
            Some(ts) => (ts.with_timezone(&chrono::Utc), TimestampConfidence::High),
            None => parse_temporal(&article.text(), article.published),
        };

        let casualties = raw
            .casualties
            .map(|c| Casualties {
                killed: c.killed,
                wounded: c.wounded,
                missing: None,
            })
            .unwrap_or_default();

        let weapons = normalize_weapons(raw.weapons);
        let location_hint = raw.location.as_ref().and_then(|l| l.hint());

        let mut event = Event {
            id: Event::new_id(),
            title: article.headline.clone(),
            enhanced_headline: raw.enhanced_headline,
            timestamp,
            timestamp_confidence,
            location: None,
            event_type: EventType::parse(&raw.conflict_type),
            severity: Severity::Low,
            escalation_score: 1,
            casualties,
            primary_actors: raw.primary_actors,
            weapon_types: weapons,
            article_ids: vec![article.content_hash.clone()],
            reliability: 0.0,
            tags: vec!["extractor:llm".to_string()],
            group_id: None,
        };
        event.set_escalation(raw.escalation_score);
        apply_overrides(&mut event);

        ExtractedEvent { event, location_hint }
    }

    fn from_draft(article: &Article, draft: DraftEvent) -> ExtractedEvent {
        let (timestamp, timestamp_confidence) = parse_temporal(&article.text(), article.published);

        let mut event = Event {
            id: Event::new_id(),
            title: article.headline.clone(),
            enhanced_headline: draft.enhanced_headline,
            timestamp,
            timestamp_confidence,
            location: None,
            event_type: draft.event_type,
            severity: Severity::Low,
            escalation_score: 1,
            casualties: draft.casualties,
            primary_actors: draft.primary_actors,
            weapon_types: normalize_weapons(draft.weapons),
            article_ids: vec![article.content_hash.clone()],
            reliability: 0.0,
            tags: vec!["extractor:pattern".to_string()],
            group_id: None,
        };
        event.set_escalation(draft.escalation_score);
        apply_overrides(&mut event);

        ExtractedEvent {
            event,
            location_hint: draft.location_hint,
        }
    }
}

fn normalize_weapons(weapons: Vec<String>) -> Vec<String> {
    let set: BTreeSet<String> = weapons
        .into_iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();
    set.into_iter().collect()
}
