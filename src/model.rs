//! Core data model: articles, events, event groups, and query audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classified type of a conflict event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ArmedConflict,
    Terrorism,
    MilitaryOperation,
    CivilUnrest,
    MilitaryExercise,
    Diplomatic,
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArmedConflict => "armed_conflict",
            Self::Terrorism => "terrorism",
            Self::MilitaryOperation => "military_operation",
            Self::CivilUnrest => "civil_unrest",
            Self::MilitaryExercise => "military_exercise",
            Self::Diplomatic => "diplomatic",
            Self::Other => "other",
        }
    }

    /// Parse from the stored string form. Unknown strings map to `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "armed_conflict" => Self::ArmedConflict,
            "terrorism" => Self::Terrorism,
            "military_operation" => Self::MilitaryOperation,
            "civil_unrest" => Self::CivilUnrest,
            "military_exercise" => Self::MilitaryExercise,
            "diplomatic" => Self::Diplomatic,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity bucket, derived from the escalation score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low = 0,
    Medium = 1,
    High = 2,
    Critical = 3,
}

impl Severity {
    /// Bucket an escalation score: 1-3 low, 4-5 medium, 6-7 high, 8-10 critical.
    pub fn from_escalation(score: u8) -> Self {
        match score {
            0..=3 => Self::Low,
            4..=5 => Self::Medium,
            6..=7 => Self::High,
            _ => Self::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "critical" => Self::Critical,
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Confidence in an event's resolved timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampConfidence {
    High,
    Medium,
    Low,
}

impl TimestampConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// Casualty counts; `None` means unreported, not zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Casualties {
    pub killed: Option<u32>,
    pub wounded: Option<u32>,
    pub missing: Option<u32>,
}

impl Casualties {
    pub fn is_empty(&self) -> bool {
        self.killed.is_none() && self.wounded.is_none() && self.missing.is_none()
    }

    /// Sum of all reported counts.
    pub fn total(&self) -> u32 {
        self.killed.unwrap_or(0) + self.wounded.unwrap_or(0) + self.missing.unwrap_or(0)
    }
}

/// How a location was resolved to coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationMethod {
    /// Exact match against the verified hotspot table
    VerifiedMatch,
    /// Ambiguity rule or post-condition override fired
    VerifiedCorrection,
    /// Curated landmark/facility mapping
    EnhancedMapping,
    /// Major city or region mapping
    BaseMapping,
    /// "N km north of X" offset
    RelativeOffset,
    /// External geocoding API
    Geocoded,
    /// No strategy produced coordinates
    Unresolved,
}

impl LocationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VerifiedMatch => "verified_match",
            Self::VerifiedCorrection => "verified_correction",
            Self::EnhancedMapping => "enhanced_mapping",
            Self::BaseMapping => "base_mapping",
            Self::RelativeOffset => "relative_offset",
            Self::Geocoded => "geocoded",
            Self::Unresolved => "unresolved",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "verified_match" => Self::VerifiedMatch,
            "verified_correction" => Self::VerifiedCorrection,
            "enhanced_mapping" => Self::EnhancedMapping,
            "base_mapping" => Self::BaseMapping,
            "relative_offset" => Self::RelativeOffset,
            "geocoded" => Self::Geocoded,
            _ => Self::Unresolved,
        }
    }
}

/// A resolved geographic location attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub lat: f64,
    pub lng: f64,
    pub name: String,
    pub country: String,
    pub region: String,
    pub method: LocationMethod,
    /// Resolution confidence in [0,1]
    pub confidence: f64,
}

impl ResolvedLocation {
    /// Coordinates lie in valid WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

/// A single fetched news item, pre-extraction.
///
/// Identity is the content hash (SHA-256 over canonicalized URL and
/// normalized body); duplicates collapse on insert and the record is
/// immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// SHA-256 dedup key
    pub content_hash: String,
    pub url: String,
    pub headline: String,
    pub body: String,
    pub published: DateTime<Utc>,
    pub source_id: String,
    /// Discovery round: 1 broad, 2 targeted
    pub round: u8,
    /// Query text that surfaced this article
    pub query: String,
}

impl Article {
    /// Build an article, computing its content hash from the canonical URL
    /// and normalized body.
    pub fn new(
        url: impl Into<String>,
        headline: impl Into<String>,
        body: impl Into<String>,
        published: DateTime<Utc>,
        source_id: impl Into<String>,
        round: u8,
        query: impl Into<String>,
    ) -> Self {
        let url = url.into();
        let body = body.into();
        let content_hash = crate::dedup::content_hash(&url, &body);
        Self {
            content_hash,
            url,
            headline: headline.into(),
            body,
            published,
            source_id: source_id.into(),
            round,
            query: query.into(),
        }
    }

    /// Headline and body joined for text analysis.
    pub fn text(&self) -> String {
        format!("{}. {}", self.headline, self.body)
    }
}

/// A structured conflict event extracted from one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    /// "WHO did WHAT to WHOM, WHERE, WHEN"
    pub enhanced_headline: String,
    pub timestamp: DateTime<Utc>,
    pub timestamp_confidence: TimestampConfidence,
    pub location: Option<ResolvedLocation>,
    pub event_type: EventType,
    pub severity: Severity,
    /// Escalation score in 1..=10; severity is derived from it
    pub escalation_score: u8,
    pub casualties: Casualties,
    /// Ordered by prominence in the article
    pub primary_actors: Vec<String>,
    /// Deduplicated, sorted
    pub weapon_types: Vec<String>,
    /// Contributing articles, at least one
    pub article_ids: Vec<String>,
    /// Aggregate source reliability in [0,1]
    pub reliability: f64,
    pub tags: Vec<String>,
    /// Set by the clusterer after grouping
    pub group_id: Option<String>,
}

impl Event {
    /// Generate a fresh event id.
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Set the escalation score, keeping the severity bucket consistent.
    pub fn set_escalation(&mut self, score: u8) {
        self.escalation_score = score.clamp(1, 10);
        self.severity = Severity::from_escalation(self.escalation_score);
    }

    /// Raise the escalation score to at least `floor`, never lowering it.
    pub fn raise_escalation_to(&mut self, floor: u8) {
        if self.escalation_score < floor {
            self.set_escalation(floor);
        }
    }
}

/// A cluster of near-duplicate events treated as one real-world incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventGroup {
    pub id: String,
    /// Ordered member event ids
    pub member_event_ids: Vec<String>,
    /// The canonical member, always present in `member_event_ids`
    pub primary_event_id: String,
    /// Mean of within-group pairwise similarities
    pub confidence: f64,
    /// Distinct sources across members
    pub corroboration_count: usize,
    /// Distinct sources / member count
    pub source_diversity: f64,
    /// Groups of size 1 are retained with `corroborated = false`
    pub corroborated: bool,
}

impl EventGroup {
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn len(&self) -> usize {
        self.member_event_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_event_ids.is_empty()
    }
}

/// Kind of generated search query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Broad,
    Targeted,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Broad => "broad",
            Self::Targeted => "targeted",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "targeted" => Self::Targeted,
            _ => Self::Broad,
        }
    }
}

/// Append-only audit record for one executed search query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAudit {
    pub query: String,
    pub kind: QueryKind,
    pub round: u8,
    pub result_count: usize,
    pub success: bool,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl QueryAudit {
    pub fn success(query: impl Into<String>, kind: QueryKind, round: u8, results: usize) -> Self {
        Self {
            query: query.into(),
            kind,
            round,
            result_count: results,
            success: true,
            error: None,
            executed_at: Utc::now(),
        }
    }

    pub fn failure(
        query: impl Into<String>,
        kind: QueryKind,
        round: u8,
        error: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            kind,
            round,
            result_count: 0,
            success: false,
            error: Some(error.into()),
            executed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_severity_buckets() {
        assert_eq!(Severity::from_escalation(1), Severity::Low);
        assert_eq!(Severity::from_escalation(3), Severity::Low);
        assert_eq!(Severity::from_escalation(4), Severity::Medium);
        assert_eq!(Severity::from_escalation(5), Severity::Medium);
        assert_eq!(Severity::from_escalation(6), Severity::High);
        assert_eq!(Severity::from_escalation(7), Severity::High);
        assert_eq!(Severity::from_escalation(8), Severity::Critical);
        assert_eq!(Severity::from_escalation(10), Severity::Critical);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_escalation_clamped_and_consistent() {
        let mut event = sample_event();
        event.set_escalation(12);
        assert_eq!(event.escalation_score, 10);
        assert_eq!(event.severity, Severity::Critical);

        event.set_escalation(0);
        assert_eq!(event.escalation_score, 1);
        assert_eq!(event.severity, Severity::Low);
    }

    #[test]
    fn test_raise_escalation_never_lowers() {
        let mut event = sample_event();
        event.set_escalation(9);
        event.raise_escalation_to(7);
        assert_eq!(event.escalation_score, 9);

        event.raise_escalation_to(10);
        assert_eq!(event.escalation_score, 10);
    }

    #[test]
    fn test_location_validity() {
        let mut loc = ResolvedLocation {
            lat: 48.5,
            lng: 37.9,
            name: "Bakhmut".into(),
            country: "Ukraine".into(),
            region: "eastern_europe".into(),
            method: LocationMethod::VerifiedMatch,
            confidence: 1.0,
        };
        assert!(loc.is_valid());

        loc.lat = 91.0;
        assert!(!loc.is_valid());
        loc.lat = 48.5;
        loc.lng = -181.0;
        assert!(!loc.is_valid());
    }

    #[test]
    fn test_enum_round_trips() {
        for ty in [
            EventType::ArmedConflict,
            EventType::Terrorism,
            EventType::MilitaryOperation,
            EventType::CivilUnrest,
            EventType::MilitaryExercise,
            EventType::Diplomatic,
            EventType::Other,
        ] {
            assert_eq!(EventType::parse(ty.as_str()), ty);
        }
        for sev in [
            Severity::Low,
            Severity::Medium,
            Severity::High,
            Severity::Critical,
        ] {
            assert_eq!(Severity::parse(sev.as_str()), sev);
        }
        for method in [
            LocationMethod::VerifiedMatch,
            LocationMethod::VerifiedCorrection,
            LocationMethod::EnhancedMapping,
            LocationMethod::BaseMapping,
            LocationMethod::RelativeOffset,
            LocationMethod::Geocoded,
            LocationMethod::Unresolved,
        ] {
            assert_eq!(LocationMethod::parse(method.as_str()), method);
        }
    }

    #[test]
    fn test_casualties_total() {
        let c = Casualties {
            killed: Some(12),
            wounded: Some(30),
            missing: None,
        };
        assert_eq!(c.total(), 42);
        assert!(!c.is_empty());
        assert!(Casualties::default().is_empty());
    }

    pub(crate) fn sample_event() -> Event {
        Event {
            id: Event::new_id(),
            title: "Shelling reported".into(),
            enhanced_headline: "Russian forces shelled Kharkiv, Ukraine, on Tuesday".into(),
            timestamp: Utc::now(),
            timestamp_confidence: TimestampConfidence::Medium,
            location: None,
            event_type: EventType::ArmedConflict,
            severity: Severity::Medium,
            escalation_score: 5,
            casualties: Casualties::default(),
            primary_actors: vec!["Russia".into()],
            weapon_types: vec![],
            article_ids: vec!["hash".into()],
            reliability: 0.8,
            tags: vec![],
            group_id: None,
        }
    }

    proptest! {
        #[test]
        fn prop_severity_agrees_with_escalation(score in 1u8..=10) {
            let severity = Severity::from_escalation(score);
            let expected = match score {
                1..=3 => Severity::Low,
                4..=5 => Severity::Medium,
                6..=7 => Severity::High,
                _ => Severity::Critical,
            };
            prop_assert_eq!(severity, expected);
        }
    }
}
