//! Text processing: language detection, entity extraction, temporal
//! parsing, relevance scoring, and token similarity.

pub mod entities;
pub mod language;
pub mod relevance;
pub mod similarity;
pub mod temporal;

pub use entities::{EntityExtractor, EntityMention, ExtractedEntities};
pub use language::detect_language;
pub use relevance::score_relevance;
pub use similarity::token_similarity;
pub use temporal::parse_temporal;
