//! Source catalog: per-source metadata, health tracking, and rate-limit
//! accounting.

pub mod registry;
pub mod seed;
pub mod types;

pub use registry::{SourceFilter, SourceRegistry};
pub use seed::default_sources;
pub use types::{normalize_name, FetchErrorKind, Source, SourceKind};
