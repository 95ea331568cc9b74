//! LLM extraction path: strict JSON prompt and schema validation.
//!
//! Any deviation from the expected shape is an [`Error::Llm`], which the
//! extractor treats the same as LLM-unavailable and answers with the
//! pattern fallback.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::Article;

/// Build the extraction prompt for one article.
pub fn build_prompt(article: &Article) -> String {
    format!(
        r#"You are an OSINT analyst. Read the news text and extract armed-conflict events.

Respond with STRICT JSON only, no prose, matching exactly:
{{
  "is_conflict": true,
  "events": [
    {{
      "enhanced_headline": "WHO did WHAT to WHOM, WHERE, WHEN",
      "conflict_type": "armed_conflict|terrorism|military_operation|civil_unrest|military_exercise|diplomatic|other",
      "severity": "low|medium|high|critical",
      "escalation_score": 1,
      "primary_actors": ["..."],
      "location": {{"name": "...", "country": "...", "city": "..."}},
      "casualties": {{"killed": 0, "wounded": 0}},
      "weapons": ["..."],
      "timestamp": "ISO-8601 or null",
      "verification_confidence": 0.0
    }}
  ]
}}

Set "is_conflict" to false (with an empty events array) when the text does
not describe a conflict event. escalation_score is an integer from 1 to 10.
One article may describe multiple distinct events.

HEADLINE: {}
PUBLISHED: {}
TEXT:
{}"#,
        article.headline,
        article.published.to_rfc3339(),
        article.body
    )
}

/// Location block as the LLM reports it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmLocation {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

impl LlmLocation {
    /// Best available hint for the georesolver.
    pub fn hint(&self) -> Option<String> {
        self.city
            .clone()
            .or_else(|| self.name.clone())
            .or_else(|| self.country.clone())
            .filter(|h| !h.trim().is_empty())
    }
}

/// Casualty block as the LLM reports it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmCasualties {
    #[serde(default)]
    pub killed: Option<u32>,
    #[serde(default)]
    pub wounded: Option<u32>,
}

/// One event in the LLM response.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmEvent {
    pub enhanced_headline: String,
    #[serde(default)]
    pub conflict_type: String,
    #[serde(default)]
    pub severity: Option<String>,
    pub escalation_score: u8,
    #[serde(default)]
    pub primary_actors: Vec<String>,
    #[serde(default)]
    pub location: Option<LlmLocation>,
    #[serde(default)]
    pub casualties: Option<LlmCasualties>,
    #[serde(default)]
    pub weapons: Vec<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub verification_confidence: Option<f64>,
}

/// Top-level LLM response.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmExtraction {
    pub is_conflict: bool,
    #[serde(default)]
    pub events: Vec<LlmEvent>,
}

/// Extract JSON from a response that may contain markdown fences.
fn extract_json_block(response: &str) -> &str {
    if let Some(start) = response.find("```json") {
        let content_start = start + 7;
        if let Some(end) = response[content_start..].find("```") {
            return response[content_start..content_start + end].trim();
        }
    }

    if let Some(start) = response.find("```") {
        let content_start = start + 3;
        let content_start = response[content_start..]
            .find('\n')
            .map(|i| content_start + i + 1)
            .unwrap_or(content_start);
        if let Some(end) = response[content_start..].find("```") {
            return response[content_start..content_start + end].trim();
        }
    }

    if let Some(start) = response.find('{') {
        if let Some(end) = response.rfind('}') {
            if end > start {
                return &response[start..=end];
            }
        }
    }

    response
}

/// Parse and validate an LLM response. Schema violations are errors; the
/// caller falls back to pattern extraction.
pub fn parse_response(content: &str) -> Result<LlmExtraction> {
    let block = extract_json_block(content);
    let extraction: LlmExtraction = serde_json::from_str(block)
        .map_err(|e| Error::Llm(format!("schema violation: {}", e)))?;

    for event in &extraction.events {
        if event.enhanced_headline.trim().is_empty() {
            return Err(Error::Llm("schema violation: empty enhanced_headline".into()));
        }
        if !(1..=10).contains(&event.escalation_score) {
            return Err(Error::Llm(format!(
                "schema violation: escalation_score {} out of range",
                event.escalation_score
            )));
        }
    }

    Ok(extraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_parse_clean_json() {
        let content = r#"{"is_conflict": true, "events": [{"enhanced_headline": "Russian forces struck Kharkiv with drones on Tuesday", "conflict_type": "armed_conflict", "escalation_score": 6, "primary_actors": ["Russia"], "weapons": ["drone"]}]}"#;
        let extraction = parse_response(content).unwrap();
        assert!(extraction.is_conflict);
        assert_eq!(extraction.events.len(), 1);
        assert_eq!(extraction.events[0].escalation_score, 6);
    }

    #[test]
    fn test_parse_fenced_json() {
        let content = "Here is the extraction:\n```json\n{\"is_conflict\": false, \"events\": []}\n```";
        let extraction = parse_response(content).unwrap();
        assert!(!extraction.is_conflict);
        assert!(extraction.events.is_empty());
    }

    #[test]
    fn test_out_of_range_escalation_is_schema_violation() {
        let content = r#"{"is_conflict": true, "events": [{"enhanced_headline": "x", "escalation_score": 14}]}"#;
        assert!(matches!(parse_response(content), Err(Error::Llm(_))));
    }

    #[test]
    fn test_empty_headline_is_schema_violation() {
        let content = r#"{"is_conflict": true, "events": [{"enhanced_headline": "  ", "escalation_score": 5}]}"#;
        assert!(matches!(parse_response(content), Err(Error::Llm(_))));
    }

    #[test]
    fn test_prose_response_is_schema_violation() {
        assert!(parse_response("I could not find any events.").is_err());
    }

    #[test]
    fn test_location_hint_preference() {
        let location = LlmLocation {
            name: Some("Donbas".into()),
            country: Some("Ukraine".into()),
            city: Some("Bakhmut".into()),
        };
        assert_eq!(location.hint().as_deref(), Some("Bakhmut"));

        let country_only = LlmLocation {
            name: None,
            country: Some("Ukraine".into()),
            city: None,
        };
        assert_eq!(country_only.hint().as_deref(), Some("Ukraine"));
    }

    #[test]
    fn test_prompt_carries_article_text() {
        let article = Article::new(
            "https://example.com/a",
            "Strike on depot",
            "A drone strike hit an ammunition depot.",
            Utc::now(),
            "src",
            1,
            "q",
        );
        let prompt = build_prompt(&article);
        assert!(prompt.contains("Strike on depot"));
        assert!(prompt.contains("ammunition depot"));
        assert!(prompt.contains("is_conflict"));
    }
}
