//! Entity extraction over regex patterns and lexicons, with an optional
//! LLM pass for recall.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::LazyLock;

use crate::llm::{CompletionRequest, LlmClient};
use crate::model::Casualties;

/// Weapon lexicon; matches are lowercased surface forms.
pub const WEAPON_LEXICON: &[&str] = &[
    "missile", "drone", "artillery", "tank", "rocket", "mortar", "airstrike",
    "bomb", "ied", "grenade", "warship", "fighter jet", "helicopter",
    "cluster munition", "ballistic missile", "hypersonic missile", "nuclear",
    "chemical weapon", "sarin", "chlorine gas", "white phosphorus", "rifle",
    "machine gun", "shelling",
];

static WEAPON_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives: Vec<String> = WEAPON_LEXICON
        .iter()
        .map(|w| regex::escape(w).replace(' ', r"\s+"))
        .collect();
    Regex::new(&format!(r"(?i)\b(?:{})s?\b", alternatives.join("|")))
        .expect("weapon pattern compiles")
});

static MILITARY_UNIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:\d+(?:st|nd|rd|th)\s+)?(?:airborne|mechanized|armored|infantry|marine)?\s?(?:brigade|battalion|regiment|division|corps)\b",
    )
    .expect("military unit pattern compiles")
});

static KILLED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*(?:people|persons?|civilians?|soldiers?|troops?)?\s*(?:were\s+)?(?:killed|dead|died)")
        .expect("killed pattern compiles")
});

static WOUNDED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*(?:people|persons?|civilians?|soldiers?|troops?)?\s*(?:were\s+)?(?:wounded|injured|hurt)")
        .expect("wounded pattern compiles")
});

static MISSING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*(?:people|persons?|civilians?|soldiers?|troops?)?\s*(?:are\s+|were\s+|remain\s+)?missing")
        .expect("missing pattern compiles")
});

static PERSON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:President|Prime Minister|General|Colonel|Minister|Commander|Chancellor|Secretary)\s+([A-Z][A-Za-z'-]+(?:\s+[A-Z][A-Za-z'-]+)?)",
    )
    .expect("person pattern compiles")
});

static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:in|at|near|outside|across)\s+((?:northern|southern|eastern|western|central)\s+)?([A-Z][A-Za-z'-]+(?:\s+[A-Z][A-Za-z'-]+){0,2})",
    )
    .expect("location pattern compiles")
});

static ORG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b([A-Z][A-Za-z'-]+(?:\s+[A-Z][A-Za-z'-]+){0,3}\s+(?:Army|Forces|Ministry|Militia|Front|Brigades|Group|Command))\b|\b((?:Hezbollah|Hamas|Taliban|Wagner|NATO|IDF|ISIS))\b",
    )
    .expect("org pattern compiles")
});

/// One extracted surface string with a confidence estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    pub text: String,
    pub confidence: f64,
}

impl EntityMention {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Entities extracted from a single text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    pub persons: Vec<EntityMention>,
    pub organizations: Vec<EntityMention>,
    pub locations: Vec<EntityMention>,
    pub weapons: Vec<EntityMention>,
    pub casualties: Vec<EntityMention>,
}

impl ExtractedEntities {
    fn push_unique(list: &mut Vec<EntityMention>, mention: EntityMention) {
        let key = mention.text.to_lowercase();
        if !list.iter().any(|m| m.text.to_lowercase() == key) {
            list.push(mention);
        }
    }

    /// Merge another extraction into this one, deduplicating by surface
    /// form and keeping the first-seen confidence.
    pub fn merge(&mut self, other: ExtractedEntities) {
        for m in other.persons {
            Self::push_unique(&mut self.persons, m);
        }
        for m in other.organizations {
            Self::push_unique(&mut self.organizations, m);
        }
        for m in other.locations {
            Self::push_unique(&mut self.locations, m);
        }
        for m in other.weapons {
            Self::push_unique(&mut self.weapons, m);
        }
        for m in other.casualties {
            Self::push_unique(&mut self.casualties, m);
        }
    }
}

/// Parse casualty counts from text. Multiple matches keep the maximum,
/// since articles commonly restate a toll as it rises.
pub fn casualty_counts(text: &str) -> Casualties {
    let max_capture = |re: &Regex| {
        re.captures_iter(text)
            .filter_map(|caps| caps[1].parse::<u32>().ok())
            .max()
    };
    Casualties {
        killed: max_capture(&KILLED_RE),
        wounded: max_capture(&WOUNDED_RE),
        missing: max_capture(&MISSING_RE),
    }
}

#[derive(Debug, Deserialize)]
struct RecallPayload {
    #[serde(default)]
    persons: Vec<String>,
    #[serde(default)]
    organizations: Vec<String>,
    #[serde(default)]
    locations: Vec<String>,
    #[serde(default)]
    weapons: Vec<String>,
}

/// Pattern-based entity extractor with an optional LLM recall pass.
#[derive(Default)]
pub struct EntityExtractor {
    llm: Option<Arc<dyn LlmClient>>,
}

impl EntityExtractor {
    pub fn new() -> Self {
        Self { llm: None }
    }

    /// Enable the recall pass. Pattern extraction always runs; the LLM
    /// only adds mentions the patterns missed.
    pub fn with_llm(client: Arc<dyn LlmClient>) -> Self {
        Self { llm: Some(client) }
    }

    /// Deterministic extraction over regex patterns and lexicons.
    pub fn extract(&self, text: &str) -> ExtractedEntities {
        let mut out = ExtractedEntities::default();

        let mut seen_weapons = HashSet::new();
        for m in WEAPON_RE.find_iter(text) {
            let raw = m
                .as_str()
                .to_lowercase()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            // Singularize only when the stem is a known lexicon entry.
            let surface = match raw.strip_suffix('s') {
                Some(stem) if WEAPON_LEXICON.contains(&stem) => stem.to_string(),
                _ => raw,
            };
            if seen_weapons.insert(surface.clone()) {
                out.weapons.push(EntityMention::new(surface, 0.9));
            }
        }

        for caps in PERSON_RE.captures_iter(text) {
            ExtractedEntities::push_unique(
                &mut out.persons,
                EntityMention::new(caps[1].to_string(), 0.8),
            );
        }

        for caps in ORG_RE.captures_iter(text) {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            if !name.is_empty() {
                ExtractedEntities::push_unique(&mut out.organizations, EntityMention::new(name, 0.8));
            }
        }

        for m in MILITARY_UNIT_RE.find_iter(text) {
            let unit = m.as_str().trim().to_string();
            if unit.len() > 5 {
                ExtractedEntities::push_unique(&mut out.organizations, EntityMention::new(unit, 0.7));
            }
        }

        for caps in LOCATION_RE.captures_iter(text) {
            let qualifier = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let name = format!("{}{}", qualifier, &caps[2]);
            ExtractedEntities::push_unique(&mut out.locations, EntityMention::new(name, 0.7));
        }

        for re in [&*KILLED_RE, &*WOUNDED_RE, &*MISSING_RE] {
            for m in re.find_iter(text) {
                ExtractedEntities::push_unique(
                    &mut out.casualties,
                    EntityMention::new(m.as_str().trim().to_string(), 0.9),
                );
            }
        }

        out
    }

    /// Extraction with the optional LLM recall pass merged in. Any LLM
    /// failure leaves the pattern result untouched.
    pub async fn extract_with_recall(&self, text: &str) -> ExtractedEntities {
        let mut entities = self.extract(text);

        let Some(client) = &self.llm else {
            return entities;
        };

        let prompt = format!(
            "List the named entities in this news text as strict JSON with keys \
             \"persons\", \"organizations\", \"locations\", \"weapons\" (arrays of strings). \
             Respond with JSON only.\n\nTEXT:\n{}",
            text
        );
        let request = CompletionRequest::new(prompt).with_max_tokens(512);

        match client.complete(request).await {
            Ok(completion) => {
                if let Ok(payload) =
                    serde_json::from_str::<RecallPayload>(completion.content.trim())
                {
                    let recall = ExtractedEntities {
                        persons: payload
                            .persons
                            .into_iter()
                            .map(|p| EntityMention::new(p, 0.6))
                            .collect(),
                        organizations: payload
                            .organizations
                            .into_iter()
                            .map(|o| EntityMention::new(o, 0.6))
                            .collect(),
                        locations: payload
                            .locations
                            .into_iter()
                            .map(|l| EntityMention::new(l, 0.6))
                            .collect(),
                        weapons: payload
                            .weapons
                            .into_iter()
                            .map(|w| EntityMention::new(w.to_lowercase(), 0.6))
                            .collect(),
                        casualties: Vec::new(),
                    };
                    entities.merge(recall);
                }
            }
            Err(err) => {
                tracing::debug!("entity recall pass skipped: {}", err);
            }
        }

        entities
    }
}
