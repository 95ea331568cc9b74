//! Environment-driven configuration.
//!
//! All settings are read once at startup into an immutable [`Config`];
//! nothing mutates global state after load. Validation reports every
//! missing mandatory credential at once rather than failing on the first.

use std::collections::HashMap;
use std::env;

use crate::error::{Error, Result};

/// Mandatory keys checked by [`Config::validate`].
const MANDATORY_KEYS: &[&str] = &[
    "DB_URL",
    "LLM_API_KEY",
    "SEARCH_API_KEY",
    "SEARCH_ENGINE_ID",
    "NEWS_API_KEY",
];

/// Default conflict zones used for broad query generation.
const DEFAULT_CONFLICT_ZONES: &[&str] = &[
    "Ukraine", "Gaza", "Israel", "Lebanon", "Syria", "Sudan", "Myanmar", "Yemen", "Somalia", "Sahel",
];

/// Database connection settings.
///
/// `url` accepts a plain SQLite path or a `sqlite://` URL. The hosted-DB
/// service/anon keys are parsed when present so deployments can carry
/// them, but the embedded store does not require them.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub service_key: Option<String>,
    pub anon_key: Option<String>,
}

impl DatabaseConfig {
    /// Filesystem path portion of the configured URL.
    pub fn path(&self) -> &str {
        self.url
            .strip_prefix("sqlite://")
            .unwrap_or(&self.url)
    }
}

/// LLM provider settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub model: String,
    /// Concurrency cap for LLM calls, independent of the collector's cap
    pub max_concurrent: usize,
}

/// Search API credentials.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub api_key: String,
    pub engine_id: String,
}

/// News API credentials.
#[derive(Debug, Clone)]
pub struct NewsSettings {
    pub api_key: String,
}

/// Runtime tunables with defaults suitable for a 15-30 minute cycle.
#[derive(Debug, Clone)]
pub struct Tunables {
    pub max_concurrent_requests: usize,
    pub batch_size: usize,
    pub dedup_window_hours: i64,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub relevance_threshold: f64,
    pub similarity_threshold: f64,
    pub round2_enabled: bool,
    pub max_articles_per_run: usize,
    pub require_location: bool,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 5,
            batch_size: 50,
            dedup_window_hours: 24,
            retry_attempts: 3,
            retry_base_delay_ms: 500,
            relevance_threshold: 0.3,
            similarity_threshold: 0.7,
            round2_enabled: true,
            max_articles_per_run: 200,
            require_location: true,
        }
    }
}

/// Alert thresholds; an event meeting any one of them fires an alert.
#[derive(Debug, Clone)]
pub struct AlertSettings {
    /// Minimum escalation score
    pub min_score: u8,
    /// Killed count above which an alert always fires
    pub killed_over: u32,
    pub webhook_url: Option<String>,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            min_score: 7,
            killed_over: 10,
            webhook_url: None,
        }
    }
}

/// Top-level configuration value.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub llm: LlmSettings,
    pub search: SearchSettings,
    pub news: NewsSettings,
    pub tunables: Tunables,
    pub alerts: AlertSettings,
    pub conflict_zones: Vec<String>,
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("invalid value for {}: {:?}", key, value))),
        None => Ok(default),
    }
}

impl Config {
    /// Load from process environment and validate mandatory credentials.
    pub fn load() -> Result<Self> {
        let config = Self::from_lookup(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build from an arbitrary key lookup. Parse failures on numeric
    /// tunables are configuration errors; missing credentials are left for
    /// [`Config::validate`] so it can report them all together.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let defaults = Tunables::default();
        let tunables = Tunables {
            max_concurrent_requests: parse_or(
                get("MAX_CONCURRENT_REQUESTS"),
                "MAX_CONCURRENT_REQUESTS",
                defaults.max_concurrent_requests,
            )?,
            batch_size: parse_or(get("BATCH_SIZE"), "BATCH_SIZE", defaults.batch_size)?,
            dedup_window_hours: parse_or(
                get("DEDUP_WINDOW_HOURS"),
                "DEDUP_WINDOW_HOURS",
                defaults.dedup_window_hours,
            )?,
            retry_attempts: parse_or(
                get("RETRY_ATTEMPTS"),
                "RETRY_ATTEMPTS",
                defaults.retry_attempts,
            )?,
            retry_base_delay_ms: parse_or(
                get("RETRY_BASE_DELAY_MS"),
                "RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay_ms,
            )?,
            relevance_threshold: parse_or(
                get("RELEVANCE_THRESHOLD"),
                "RELEVANCE_THRESHOLD",
                defaults.relevance_threshold,
            )?,
            similarity_threshold: parse_or(
                get("SIMILARITY_THRESHOLD"),
                "SIMILARITY_THRESHOLD",
                defaults.similarity_threshold,
            )?,
            round2_enabled: parse_or(
                get("ROUND2_ENABLED"),
                "ROUND2_ENABLED",
                defaults.round2_enabled,
            )?,
            max_articles_per_run: parse_or(
                get("MAX_ARTICLES_PER_RUN"),
                "MAX_ARTICLES_PER_RUN",
                defaults.max_articles_per_run,
            )?,
            require_location: parse_or(
                get("REQUIRE_LOCATION"),
                "REQUIRE_LOCATION",
                defaults.require_location,
            )?,
        };

        let alert_defaults = AlertSettings::default();
        let alerts = AlertSettings {
            min_score: parse_or(get("ALERT_MIN_SCORE"), "ALERT_MIN_SCORE", alert_defaults.min_score)?,
            killed_over: parse_or(
                get("ALERT_KILLED_OVER"),
                "ALERT_KILLED_OVER",
                alert_defaults.killed_over,
            )?,
            webhook_url: get("ALERT_WEBHOOK_URL"),
        };

        let conflict_zones = match get("CONFLICT_ZONES") {
            Some(raw) => raw
                .split(',')
                .map(|z| z.trim().to_string())
                .filter(|z| !z.is_empty())
                .collect(),
            None => DEFAULT_CONFLICT_ZONES.iter().map(|z| z.to_string()).collect(),
        };

        Ok(Self {
            database: DatabaseConfig {
                url: get("DB_URL").unwrap_or_default(),
                service_key: get("DB_SERVICE_KEY"),
                anon_key: get("DB_ANON_KEY"),
            },
            llm: LlmSettings {
                api_key: get("LLM_API_KEY").unwrap_or_default(),
                model: get("LLM_MODEL").unwrap_or_else(|| "claude-3-5-haiku-20241022".to_string()),
                max_concurrent: parse_or(get("LLM_MAX_CONCURRENT"), "LLM_MAX_CONCURRENT", 4)?,
            },
            search: SearchSettings {
                api_key: get("SEARCH_API_KEY").unwrap_or_default(),
                engine_id: get("SEARCH_ENGINE_ID").unwrap_or_default(),
            },
            news: NewsSettings {
                api_key: get("NEWS_API_KEY").unwrap_or_default(),
            },
            tunables,
            alerts,
            conflict_zones,
        })
    }

    /// Check mandatory credentials, reporting every missing key at once.
    pub fn validate(&self) -> Result<()> {
        let present: HashMap<&str, bool> = HashMap::from([
            ("DB_URL", !self.database.url.is_empty()),
            ("LLM_API_KEY", !self.llm.api_key.is_empty()),
            ("SEARCH_API_KEY", !self.search.api_key.is_empty()),
            ("SEARCH_ENGINE_ID", !self.search.engine_id.is_empty()),
            ("NEWS_API_KEY", !self.news.api_key.is_empty()),
        ]);

        let missing: Vec<String> = MANDATORY_KEYS
            .iter()
            .filter(|key| !present.get(*key).copied().unwrap_or(false))
            .map(|key| key.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::missing_config(missing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DB_URL", "sqlite:///tmp/vigil.db"),
            ("LLM_API_KEY", "llm-key"),
            ("SEARCH_API_KEY", "search-key"),
            ("SEARCH_ENGINE_ID", "engine"),
            ("NEWS_API_KEY", "news-key"),
        ])
    }

    fn lookup<'a>(map: &'a HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn test_load_with_defaults() {
        let env = full_env();
        let config = Config::from_lookup(lookup(&env)).unwrap();
        config.validate().unwrap();

        assert_eq!(config.tunables.batch_size, 50);
        assert_eq!(config.tunables.relevance_threshold, 0.3);
        assert_eq!(config.tunables.similarity_threshold, 0.7);
        assert!(config.tunables.round2_enabled);
        assert!(config.tunables.require_location);
        assert_eq!(config.alerts.min_score, 7);
        assert!(config.conflict_zones.contains(&"Ukraine".to_string()));
    }

    #[test]
    fn test_validate_lists_every_missing_key() {
        let config = Config::from_lookup(|_| None).unwrap();
        let err = config.validate().unwrap_err();
        match err {
            Error::MissingConfig { keys } => {
                assert_eq!(
                    keys,
                    vec![
                        "DB_URL",
                        "LLM_API_KEY",
                        "SEARCH_API_KEY",
                        "SEARCH_ENGINE_ID",
                        "NEWS_API_KEY"
                    ]
                );
            }
            other => panic!("expected MissingConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_db_path_strips_scheme() {
        let env = full_env();
        let config = Config::from_lookup(lookup(&env)).unwrap();
        assert_eq!(config.database.path(), "/tmp/vigil.db");
    }

    #[test]
    fn test_invalid_numeric_is_config_error() {
        let mut env = full_env();
        env.insert("BATCH_SIZE", "not-a-number");
        let err = Config::from_lookup(lookup(&env)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_conflict_zones_override() {
        let mut env = full_env();
        env.insert("CONFLICT_ZONES", "Ukraine, Gaza ,Taiwan Strait");
        let config = Config::from_lookup(lookup(&env)).unwrap();
        assert_eq!(config.conflict_zones, vec!["Ukraine", "Gaza", "Taiwan Strait"]);
    }

    #[test]
    fn test_tunable_overrides() {
        let mut env = full_env();
        env.insert("MAX_CONCURRENT_REQUESTS", "9");
        env.insert("ROUND2_ENABLED", "false");
        let config = Config::from_lookup(lookup(&env)).unwrap();
        assert_eq!(config.tunables.max_concurrent_requests, 9);
        assert!(!config.tunables.round2_enabled);
    }
}
