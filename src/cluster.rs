//! Similarity-based event clustering.
//!
//! Pairwise similarity combines temporal, geographic, actor, and type
//! components; single-link grouping above the threshold partitions a
//! cycle's events into event groups. Clustering never drops an event:
//! anything below threshold to every other event becomes a singleton
//! group.

use std::collections::{HashMap, HashSet};

use crate::geo::haversine_km;
use crate::model::{Event, EventGroup};

/// Temporal decay horizon (τ).
const TEMPORAL_WINDOW_HOURS: f64 = 6.0;
/// Geographic decay radius in km (ρ).
const GEO_RADIUS_KM: f64 = 50.0;

const WEIGHT_TEMPORAL: f64 = 0.3;
const WEIGHT_GEOGRAPHIC: f64 = 0.4;
const WEIGHT_ACTOR: f64 = 0.2;
const WEIGHT_TYPE: f64 = 0.1;

/// Pairwise similarity between two events, in [0,1].
pub fn event_similarity(a: &Event, b: &Event) -> f64 {
    let delta_hours = (a.timestamp - b.timestamp).num_minutes().abs() as f64 / 60.0;
    let temporal = (1.0 - delta_hours / TEMPORAL_WINDOW_HOURS).max(0.0);

    let geographic = match (&a.location, &b.location) {
        (Some(la), Some(lb)) => {
            let distance = haversine_km(la.lat, la.lng, lb.lat, lb.lng);
            (1.0 - distance / GEO_RADIUS_KM).max(0.0)
        }
        _ => 0.0,
    };

    let actors_a: HashSet<String> = a.primary_actors.iter().map(|s| s.to_lowercase()).collect();
    let actors_b: HashSet<String> = b.primary_actors.iter().map(|s| s.to_lowercase()).collect();
    let intersection = actors_a.intersection(&actors_b).count() as f64;
    let union = actors_a.union(&actors_b).count() as f64;
    // Jaccard overlap; two empty actor sets carry no signal and score 0.
    let actor = if union == 0.0 { 0.0 } else { intersection / union };

    let type_component = if a.event_type == b.event_type { 1.0 } else { 0.0 };

    WEIGHT_TEMPORAL * temporal
        + WEIGHT_GEOGRAPHIC * geographic
        + WEIGHT_ACTOR * actor
        + WEIGHT_TYPE * type_component
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, i: usize) -> usize {
        if self.parent[i] != i {
            let root = self.find(self.parent[i]);
            self.parent[i] = root;
        }
        self.parent[i]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

/// Partition events into groups, setting each event's `group_id`.
///
/// `source_of` maps article ids to source ids; it feeds the corroboration
/// count and source-diversity score.
pub fn cluster_events(
    events: &mut [Event],
    threshold: f64,
    source_of: &HashMap<String, String>,
) -> Vec<EventGroup> {
    if events.is_empty() {
        return Vec::new();
    }

    let n = events.len();
    let mut uf = UnionFind::new(n);
    let mut pair_sims: HashMap<(usize, usize), f64> = HashMap::new();

    for i in 0..n {
        for j in (i + 1)..n {
            let sim = event_similarity(&events[i], &events[j]);
            pair_sims.insert((i, j), sim);
            if sim >= threshold {
                uf.union(i, j);
            }
        }
    }

    let mut members_by_root: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..n {
        let root = uf.find(i);
        members_by_root.entry(root).or_default().push(i);
    }

    let mut groups = Vec::new();
    let mut roots: Vec<usize> = members_by_root.keys().copied().collect();
    roots.sort_unstable();

    for root in roots {
        let mut members = members_by_root.remove(&root).expect("root exists");
        members.sort_unstable();

        // Primary: highest reliability, ties to earliest timestamp, then
        // lexicographic id.
        let primary_idx = *members
            .iter()
            .min_by(|&&a, &&b| {
                let ea = &events[a];
                let eb = &events[b];
                eb.reliability
                    .partial_cmp(&ea.reliability)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| ea.timestamp.cmp(&eb.timestamp))
                    .then_with(|| ea.id.cmp(&eb.id))
            })
            .expect("group is non-empty");

        let confidence = if members.len() < 2 {
            1.0
        } else {
            let mut total = 0.0;
            let mut count = 0usize;
            for (a_pos, &a) in members.iter().enumerate() {
                for &b in &members[a_pos + 1..] {
                    let key = if a < b { (a, b) } else { (b, a) };
                    total += pair_sims.get(&key).copied().unwrap_or(0.0);
                    count += 1;
                }
            }
            total / count as f64
        };

        let sources: HashSet<&String> = members
            .iter()
            .flat_map(|&i| events[i].article_ids.iter())
            .filter_map(|article_id| source_of.get(article_id))
            .collect();
        let corroboration_count = sources.len();
        let source_diversity = corroboration_count as f64 / members.len() as f64;

        let group = EventGroup {
            id: EventGroup::new_id(),
            member_event_ids: members.iter().map(|&i| events[i].id.clone()).collect(),
            primary_event_id: events[primary_idx].id.clone(),
            confidence,
            corroboration_count,
            source_diversity: source_diversity.min(1.0),
            corroborated: members.len() > 1,
        };

        for &i in &members {
            events[i].group_id = Some(group.id.clone());
        }
        groups.push(group);
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Casualties, EventType, LocationMethod, ResolvedLocation, Severity, TimestampConfidence,
    };
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;

    fn kharkiv() -> ResolvedLocation {
        ResolvedLocation {
            lat: 49.9935,
            lng: 36.2304,
            name: "Kharkiv".into(),
            country: "Ukraine".into(),
            region: "eastern_europe".into(),
            method: LocationMethod::BaseMapping,
            confidence: 0.8,
        }
    }

    fn event(
        id: &str,
        timestamp: DateTime<Utc>,
        location: Option<ResolvedLocation>,
        actors: &[&str],
        article_id: &str,
        reliability: f64,
    ) -> Event {
        Event {
            id: id.to_string(),
            title: "Drone strike on power substation".into(),
            enhanced_headline: "Russian forces struck Kharkiv substations".into(),
            timestamp,
            timestamp_confidence: TimestampConfidence::Medium,
            location,
            event_type: EventType::ArmedConflict,
            severity: Severity::Medium,
            escalation_score: 5,
            casualties: Casualties::default(),
            primary_actors: actors.iter().map(|a| a.to_string()).collect(),
            weapon_types: vec!["drone".into()],
            article_ids: vec![article_id.to_string()],
            reliability,
            tags: vec![],
            group_id: None,
        }
    }

    fn t(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_identical_events_high_similarity() {
        let a = event("a", t(10, 0), Some(kharkiv()), &["Russia"], "art1", 0.9);
        let b = event("b", t(10, 0), Some(kharkiv()), &["Russia"], "art2", 0.8);
        assert!(event_similarity(&a, &b) > 0.95);
    }

    #[test]
    fn test_empty_actor_sets_contribute_nothing() {
        // Same time, place, and type, but neither report names an actor.
        // The shared headline text must not leak into the actor component:
        // only temporal (0.3) + geographic (0.4) + type (0.1) remain.
        let a = event("a", t(10, 0), Some(kharkiv()), &[], "art1", 0.9);
        let b = event("b", t(10, 0), Some(kharkiv()), &[], "art2", 0.8);
        let sim = event_similarity(&a, &b);
        assert!((sim - 0.8).abs() < 1e-9, "similarity was {}", sim);
    }

    #[test]
    fn test_one_sided_actor_set_scores_zero_overlap() {
        let a = event("a", t(10, 0), Some(kharkiv()), &["Russia"], "art1", 0.9);
        let b = event("b", t(10, 0), Some(kharkiv()), &[], "art2", 0.8);
        let sim = event_similarity(&a, &b);
        assert!((sim - 0.8).abs() < 1e-9, "similarity was {}", sim);
    }

    #[test]
    fn test_distant_events_low_similarity() {
        let mut far = kharkiv();
        far.lat = 31.5;
        far.lng = 34.4;
        let a = event("a", t(10, 0), Some(kharkiv()), &["Russia"], "art1", 0.9);
        let b = event("b", t(23, 0), Some(far), &["IDF"], "art2", 0.8);
        assert!(event_similarity(&a, &b) < 0.2);
    }

    #[test]
    fn test_two_sources_one_event_grouping() {
        // Same strike reported by two outlets forty minutes apart.
        let mut events = vec![
            event("a", t(10, 0), Some(kharkiv()), &["Russia"], "art-reuters", 0.95),
            event("b", t(10, 40), Some(kharkiv()), &["Russia"], "art-bbc", 0.90),
        ];
        let source_of = HashMap::from([
            ("art-reuters".to_string(), "reuters".to_string()),
            ("art-bbc".to_string(), "bbc_world".to_string()),
        ]);

        let groups = cluster_events(&mut events, 0.7, &source_of);
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.member_event_ids.len(), 2);
        assert_eq!(group.corroboration_count, 2);
        assert!((group.source_diversity - 1.0).abs() < 1e-9);
        assert!(group.corroborated);
        // Primary is the higher-reliability member.
        assert_eq!(group.primary_event_id, "a");
        assert!(events.iter().all(|e| e.group_id.as_deref() == Some(group.id.as_str())));
    }

    #[test]
    fn test_dissimilar_events_become_singletons() {
        let mut far = kharkiv();
        far.lat = 15.5;
        far.lng = 32.5;
        far.country = "Sudan".into();
        let mut events = vec![
            event("a", t(1, 0), Some(kharkiv()), &["Russia"], "art1", 0.9),
            event("b", t(23, 0), Some(far), &["RSF"], "art2", 0.8),
        ];
        let source_of = HashMap::from([
            ("art1".to_string(), "s1".to_string()),
            ("art2".to_string(), "s2".to_string()),
        ]);

        let groups = cluster_events(&mut events, 0.7, &source_of);
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.member_event_ids.len() == 1));
        assert!(groups.iter().all(|g| !g.corroborated));
    }

    #[test]
    fn test_primary_tie_breaks_on_time_then_id() {
        let mut events = vec![
            event("b", t(10, 0), Some(kharkiv()), &["Russia"], "art1", 0.9),
            event("a", t(10, 0), Some(kharkiv()), &["Russia"], "art2", 0.9),
        ];
        let source_of = HashMap::new();
        let groups = cluster_events(&mut events, 0.7, &source_of);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].primary_event_id, "a");
    }

    #[test]
    fn test_empty_input() {
        let mut events: Vec<Event> = Vec::new();
        assert!(cluster_events(&mut events, 0.7, &HashMap::new()).is_empty());
    }

    #[test]
    fn test_single_link_transitivity() {
        // a~b and b~c above threshold pulls a and c into one group even if
        // a~c alone is below it.
        let mut events = vec![
            event("a", t(10, 0), Some(kharkiv()), &["Russia"], "art1", 0.9),
            event("b", t(12, 0), Some(kharkiv()), &["Russia", "Ukraine"], "art2", 0.9),
            event("c", t(14, 0), Some(kharkiv()), &["Ukraine"], "art3", 0.9),
        ];
        let sim_ac = event_similarity(&events[0], &events[2]);
        assert!(sim_ac < 0.7);
        let groups = cluster_events(&mut events, 0.7, &HashMap::new());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].member_event_ids.len(), 3);
    }

    proptest! {
        #[test]
        fn prop_every_event_in_exactly_one_group(
            count in 1usize..12,
            hours in proptest::collection::vec(0u32..24, 12),
        ) {
            let mut events: Vec<Event> = (0..count)
                .map(|i| event(
                    &format!("e{}", i),
                    t(hours[i], 0),
                    Some(kharkiv()),
                    &["Russia"],
                    &format!("art{}", i),
                    0.8,
                ))
                .collect();
            let groups = cluster_events(&mut events, 0.7, &HashMap::new());

            let mut seen = HashSet::new();
            for group in &groups {
                prop_assert!(group.member_event_ids.contains(&group.primary_event_id));
                for id in &group.member_event_ids {
                    prop_assert!(seen.insert(id.clone()), "event {} in two groups", id);
                }
            }
            prop_assert_eq!(seen.len(), count);
            for event in &events {
                prop_assert!(event.group_id.is_some());
            }
        }
    }
}
