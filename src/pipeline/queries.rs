//! Query generation for both retrieval rounds and entity mining between
//! them.

use std::collections::{HashMap, HashSet};

use crate::model::Event;
use crate::text::relevance::CONFLICT_KEYWORDS;

/// Broad-round query cap.
pub const MAX_BROAD_QUERIES: usize = 20;
/// Targeted-round query cap.
pub const MAX_TARGETED_QUERIES: usize = 10;

const BROAD_TEMPLATES: &[&str] = &[
    "{zone} military conflict today",
    "{zone} casualties killed wounded",
    "{zone} missile strike bombing latest",
];

/// Words too generic to mine as round-2 keywords, on top of the conflict
/// lexicon itself.
const GENERIC_WORDS: &[&str] = &[
    "report", "reports", "reported", "according", "officials", "sources", "country",
    "region", "forces", "people", "military", "attack", "strike",
];

/// Defaults for entity mining: top locations, actors per location,
/// keywords.
pub const MINE_LOCATIONS: usize = 3;
pub const MINE_ACTORS_PER_LOCATION: usize = 2;
pub const MINE_KEYWORDS: usize = 5;

/// Generate up to [`MAX_BROAD_QUERIES`] broad queries from the configured
/// conflict zones.
pub fn broad_queries(zones: &[String]) -> Vec<String> {
    let mut queries = Vec::new();
    'outer: for zone in zones {
        for template in BROAD_TEMPLATES {
            if queries.len() >= MAX_BROAD_QUERIES {
                break 'outer;
            }
            queries.push(template.replace("{zone}", zone));
        }
    }
    queries
}

/// Entities mined from round-1 events for targeted retrieval.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MinedEntities {
    /// Top locations, each with its top co-occurring actors
    pub locations: Vec<(String, Vec<String>)>,
    /// Salient non-generic keywords
    pub keywords: Vec<String>,
}

fn top_counts(counts: HashMap<String, usize>, k: usize) -> Vec<String> {
    let mut entries: Vec<(String, usize)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.into_iter().take(k).map(|(name, _)| name).collect()
}

/// Mine top-k locations, their actors, and salient keywords from
/// round-1 events.
pub fn mine_entities(events: &[Event]) -> MinedEntities {
    let mut location_counts: HashMap<String, usize> = HashMap::new();
    let mut actors_by_location: HashMap<String, HashMap<String, usize>> = HashMap::new();
    let mut keyword_counts: HashMap<String, usize> = HashMap::new();

    for event in events {
        let location = event.location.as_ref().map(|l| {
            if l.country.is_empty() {
                l.name.clone()
            } else {
                l.country.clone()
            }
        });

        if let Some(location) = &location {
            *location_counts.entry(location.clone()).or_insert(0) += 1;
            let actor_counts = actors_by_location.entry(location.clone()).or_default();
            for actor in &event.primary_actors {
                *actor_counts.entry(actor.clone()).or_insert(0) += 1;
            }
        }

        for word in event
            .enhanced_headline
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 5)
        {
            let lowered = word.to_lowercase();
            if CONFLICT_KEYWORDS.contains(&lowered.as_str())
                || GENERIC_WORDS.contains(&lowered.as_str())
            {
                continue;
            }
            *keyword_counts.entry(lowered).or_insert(0) += 1;
        }
    }

    let locations = top_counts(location_counts, MINE_LOCATIONS)
        .into_iter()
        .map(|location| {
            let actors = actors_by_location
                .remove(&location)
                .map(|counts| top_counts(counts, MINE_ACTORS_PER_LOCATION))
                .unwrap_or_default();
            (location, actors)
        })
        .collect();

    MinedEntities {
        locations,
        keywords: top_counts(keyword_counts, MINE_KEYWORDS),
    }
}

/// Form up to [`MAX_TARGETED_QUERIES`] round-2 queries, disjoint from the
/// round-1 query set.
pub fn targeted_queries(mined: &MinedEntities, round1_queries: &HashSet<String>) -> Vec<String> {
    let mut queries = Vec::new();
    let mut seen: HashSet<String> = round1_queries.clone();

    let mut push = |query: String, queries: &mut Vec<String>| {
        if queries.len() < MAX_TARGETED_QUERIES && seen.insert(query.clone()) {
            queries.push(query);
        }
    };

    for (location, actors) in &mined.locations {
        if actors.is_empty() {
            push(format!("{} military operations latest", location), &mut queries);
        }
        for actor in actors {
            push(
                format!("{} {} military operations latest", location, actor),
                &mut queries,
            );
        }
    }

    for keyword in &mined.keywords {
        push(format!("{} conflict military latest", keyword), &mut queries);
    }

    queries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Casualties, EventType, LocationMethod, ResolvedLocation, Severity, TimestampConfidence,
    };
    use chrono::Utc;

    fn event(country: &str, actors: &[&str], headline: &str) -> Event {
        Event {
            id: Event::new_id(),
            title: headline.to_string(),
            enhanced_headline: headline.to_string(),
            timestamp: Utc::now(),
            timestamp_confidence: TimestampConfidence::Low,
            location: Some(ResolvedLocation {
                lat: 0.0,
                lng: 0.0,
                name: country.to_string(),
                country: country.to_string(),
                region: "other".into(),
                method: LocationMethod::BaseMapping,
                confidence: 0.8,
            }),
            event_type: EventType::ArmedConflict,
            severity: Severity::Medium,
            escalation_score: 5,
            casualties: Casualties::default(),
            primary_actors: actors.iter().map(|a| a.to_string()).collect(),
            weapon_types: vec![],
            article_ids: vec!["a".into()],
            reliability: 0.8,
            tags: vec![],
            group_id: None,
        }
    }

    #[test]
    fn test_broad_queries_capped_at_twenty() {
        let zones: Vec<String> = (0..10).map(|i| format!("Zone{}", i)).collect();
        let queries = broad_queries(&zones);
        assert_eq!(queries.len(), MAX_BROAD_QUERIES);
        assert!(queries[0].contains("Zone0"));
    }

    #[test]
    fn test_broad_queries_use_templates() {
        let queries = broad_queries(&["Ukraine".to_string()]);
        assert_eq!(
            queries,
            vec![
                "Ukraine military conflict today",
                "Ukraine casualties killed wounded",
                "Ukraine missile strike bombing latest",
            ]
        );
    }

    #[test]
    fn test_mine_entities_top_locations_and_actors() {
        let events = vec![
            event("Ukraine", &["Russia"], "Russian shelling of Kharkiv"),
            event("Ukraine", &["Russia", "Ukraine"], "Drone barrage hit substations"),
            event("Palestine", &["IDF"], "Airstrike on Rafah"),
        ];
        let mined = mine_entities(&events);

        assert_eq!(mined.locations[0].0, "Ukraine");
        assert_eq!(mined.locations[0].1[0], "Russia");
        assert!(mined.locations.iter().any(|(l, _)| l == "Palestine"));
        // "substations" survives the filters; generic words do not.
        assert!(mined.keywords.iter().any(|k| k == "substations"));
    }

    #[test]
    fn test_targeted_queries_disjoint_from_round1() {
        let mined = MinedEntities {
            locations: vec![("Ukraine".into(), vec!["Russia".into()])],
            keywords: vec!["kharkiv".into()],
        };
        let round1: HashSet<String> =
            HashSet::from(["Ukraine Russia military operations latest".to_string()]);

        let queries = targeted_queries(&mined, &round1);
        assert!(!queries.contains(&"Ukraine Russia military operations latest".to_string()));
        assert!(queries.contains(&"kharkiv conflict military latest".to_string()));
    }

    #[test]
    fn test_targeted_queries_capped_at_ten() {
        let mined = MinedEntities {
            locations: (0..8)
                .map(|i| (format!("Loc{}", i), vec!["A".to_string(), "B".to_string()]))
                .collect(),
            keywords: (0..8).map(|i| format!("keyword{}", i)).collect(),
        };
        let queries = targeted_queries(&mined, &HashSet::new());
        assert_eq!(queries.len(), MAX_TARGETED_QUERIES);
    }

    #[test]
    fn test_round2_query_shape() {
        let mined = MinedEntities {
            locations: vec![("Ukraine".into(), vec!["Russia".into()])],
            keywords: vec![],
        };
        let queries = targeted_queries(&mined, &HashSet::new());
        assert_eq!(queries, vec!["Ukraine Russia military operations latest"]);
    }
}
