//! Seeded source catalog.
//!
//! The seeded feed list is advisory, not authoritative: feeds move and
//! break, and the registry's health decay plus operator reactivation is
//! what keeps the catalog honest over time.

use super::types::{Source, SourceKind};

/// Default source catalog registered on first run.
pub fn default_sources() -> Vec<Source> {
    vec![
        Source::new("Google Search", "https://www.googleapis.com/customsearch/v1", SourceKind::SearchApi)
            .with_reliability(70.0)
            .with_rate_limit(40),
        Source::new("News API", "https://newsapi.org/v2/everything", SourceKind::NewsApi)
            .with_reliability(75.0)
            .with_rate_limit(40),
        Source::new("BBC World", "https://feeds.bbci.co.uk/news/world/rss.xml", SourceKind::Rss)
            .with_reliability(90.0)
            .with_bias(-0.1)
            .with_regions(vec!["global".into()])
            .with_rate_limit(6),
        Source::new("Reuters World", "https://www.reutersagency.com/feed/?best-topics=world", SourceKind::Rss)
            .with_reliability(95.0)
            .with_regions(vec!["global".into()])
            .with_rate_limit(6),
        Source::new("Al Jazeera", "https://www.aljazeera.com/xml/rss/all.xml", SourceKind::Rss)
            .with_reliability(85.0)
            .with_bias(0.1)
            .with_regions(vec!["middle_east".into(), "africa".into()])
            .with_rate_limit(6),
        Source::new("Kyiv Independent", "https://kyivindependent.com/feed", SourceKind::Rss)
            .with_reliability(80.0)
            .with_bias(-0.2)
            .with_regions(vec!["eastern_europe".into()])
            .with_rate_limit(6),
        Source::new("Times of Israel", "https://www.timesofisrael.com/feed/", SourceKind::Rss)
            .with_reliability(80.0)
            .with_bias(0.2)
            .with_regions(vec!["middle_east".into()])
            .with_rate_limit(6),
        Source::new("France 24", "https://www.france24.com/en/rss", SourceKind::Rss)
            .with_reliability(85.0)
            .with_regions(vec!["global".into(), "africa".into()])
            .with_rate_limit(6),
        Source::new("Deutsche Welle", "https://rss.dw.com/rdf/rss-en-world", SourceKind::Rss)
            .with_reliability(85.0)
            .with_regions(vec!["global".into()])
            .with_rate_limit(6),
        Source::new("Defense Post", "https://thedefensepost.com/feed/", SourceKind::Rss)
            .with_reliability(70.0)
            .with_regions(vec!["global".into()])
            .with_rate_limit(4),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_seed_names_are_unique() {
        let sources = default_sources();
        let names: HashSet<String> = sources.iter().map(|s| s.name.clone()).collect();
        assert_eq!(names.len(), sources.len());
    }

    #[test]
    fn test_seed_contains_all_kinds() {
        let sources = default_sources();
        assert!(sources.iter().any(|s| s.kind == SourceKind::SearchApi));
        assert!(sources.iter().any(|s| s.kind == SourceKind::NewsApi));
        assert!(sources.iter().filter(|s| s.kind == SourceKind::Rss).count() >= 5);
    }

    #[test]
    fn test_seed_scores_in_range() {
        for source in default_sources() {
            assert!((0.0..=100.0).contains(&source.reliability), "{}", source.name);
            assert!((-1.0..=1.0).contains(&source.bias), "{}", source.name);
            assert!(source.rate_limit_per_hour > 0, "{}", source.name);
        }
    }
}
