//! Source types and identity normalization.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of source endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Rss,
    SearchApi,
    NewsApi,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rss => "rss",
            Self::SearchApi => "search_api",
            Self::NewsApi => "news_api",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "search_api" => Self::SearchApi,
            "news_api" => Self::NewsApi,
            _ => Self::Rss,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classified fetch failure, recorded against a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Network,
    Http5xx,
    Http4xx,
    Timeout,
    Parse,
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Http5xx => write!(f, "http_5xx"),
            Self::Http4xx => write!(f, "http_4xx"),
            Self::Timeout => write!(f, "timeout"),
            Self::Parse => write!(f, "parse"),
        }
    }
}

/// Normalize a source name: lowercase, non-alphanumerics collapsed to `_`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_underscore = false;
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_underscore = false;
        } else if !last_underscore && !out.is_empty() {
            out.push('_');
            last_underscore = true;
        }
    }
    out.trim_end_matches('_').to_string()
}

/// A registered feed or API endpoint with health accounting.
///
/// Sources are created on first observation and never deleted;
/// deactivation happens automatically after ten consecutive failures and
/// reactivation is operator-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    /// Normalized identity key
    pub name: String,
    pub display_name: String,
    pub endpoint: String,
    pub kind: SourceKind,
    /// ISO-639-1 language code
    pub language: String,
    /// Declared geographic expertise
    pub regions: Vec<String>,
    /// Reliability score in [0,100]
    pub reliability: f64,
    /// Bias score in [-1,1]
    pub bias: f64,
    pub rate_limit_per_hour: u32,
    /// Health in [0,1]; 0 once deactivated
    pub health: f64,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub daily_access_count: u32,
    /// Day the daily counter refers to
    pub access_day: NaiveDate,
    pub active: bool,
}

impl Source {
    pub fn new(display_name: impl Into<String>, endpoint: impl Into<String>, kind: SourceKind) -> Self {
        let display_name = display_name.into();
        Self {
            id: Uuid::new_v4().to_string(),
            name: normalize_name(&display_name),
            display_name,
            endpoint: endpoint.into(),
            kind,
            language: "en".to_string(),
            regions: Vec::new(),
            reliability: 50.0,
            bias: 0.0,
            rate_limit_per_hour: 10,
            health: 1.0,
            consecutive_failures: 0,
            last_success: None,
            daily_access_count: 0,
            access_day: Utc::now().date_naive(),
            active: true,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_regions(mut self, regions: Vec<String>) -> Self {
        self.regions = regions;
        self
    }

    pub fn with_reliability(mut self, reliability: f64) -> Self {
        self.reliability = reliability.clamp(0.0, 100.0);
        self
    }

    pub fn with_bias(mut self, bias: f64) -> Self {
        self.bias = bias.clamp(-1.0, 1.0);
        self
    }

    pub fn with_rate_limit(mut self, per_hour: u32) -> Self {
        self.rate_limit_per_hour = per_hour;
        self
    }

    /// Reliability scaled to [0,1] for event aggregation.
    pub fn reliability_unit(&self) -> f64 {
        (self.reliability / 100.0).clamp(0.0, 1.0)
    }
}
