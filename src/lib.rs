//! # vigil
//!
//! An OSINT conflict-event ingestion pipeline: a scheduled, idempotent
//! batch processor that discovers open-source news about armed conflict,
//! extracts structured event records, clusters near-duplicates across
//! sources, and persists the results with geographic indexing.
//!
//! ## Core Components
//!
//! - **Sources**: feed/API catalog with health tracking and rate limits
//! - **Collect**: search, news-API, and RSS fan-out with bounded concurrency
//! - **Dedup**: URL and content-hash membership over a rolling window
//! - **Text**: language detection, entities, temporal parsing, relevance
//! - **Extract**: LLM extraction with a deterministic pattern fallback
//! - **Geo**: multi-strategy location resolution with verified overrides
//! - **Cluster**: similarity grouping into primary-plus-group records
//! - **Store**: SQLite persistence, idempotent on content hash
//! - **Pipeline**: the two-round orchestrator
//! - **Alert**: threshold alerts to pluggable sinks
//!
//! ## Example
//!
//! ```rust,ignore
//! use vigil::config::Config;
//! use vigil::pipeline::{CycleOptions, Orchestrator};
//!
//! let config = Config::load()?;
//! let orchestrator = Orchestrator::from_config(config).await?;
//! let stats = orchestrator.run_cycle(&CycleOptions::default()).await?;
//! println!("{} events in {} groups", stats.total_events(), stats.groups);
//! ```

pub mod alert;
pub mod cluster;
pub mod collect;
pub mod config;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod geo;
pub mod llm;
pub mod model;
pub mod pipeline;
pub mod sources;
pub mod store;
pub mod text;

// Re-exports for convenience
pub use alert::{Alert, AlertEmitter, AlertSink, LogSink, WebhookSink};
pub use cluster::{cluster_events, event_similarity};
pub use collect::{Collector, CollectorConfig, StrategySelection};
pub use config::Config;
pub use dedup::{canonicalize_url, content_hash, DedupIndex};
pub use error::{Error, Result};
pub use extract::{EventExtractor, ExtractedEvent};
pub use geo::{GeoResolver, Geocoder, HttpGeocoder};
pub use llm::{AnthropicClient, ClientConfig, GatedClient, LlmClient, OpenAiClient};
pub use model::{
    Article, Casualties, Event, EventGroup, EventType, LocationMethod, QueryAudit, QueryKind,
    ResolvedLocation, Severity, TimestampConfidence,
};
pub use pipeline::{CycleOptions, CycleStats, Orchestrator};
pub use sources::{Source, SourceKind, SourceRegistry};
pub use store::{EventFilter, EventStore};
pub use text::{detect_language, parse_temporal, score_relevance, token_similarity, EntityExtractor};
