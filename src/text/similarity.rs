//! Token-bag cosine similarity, the language-agnostic fallback for
//! comparing report texts.

use std::collections::HashMap;

fn token_counts(text: &str) -> HashMap<String, f64> {
    let mut counts = HashMap::new();
    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
    {
        *counts.entry(token.to_string()).or_insert(0.0) += 1.0;
    }
    counts
}

/// Cosine similarity over token bags, in [0,1].
pub fn token_similarity(a: &str, b: &str) -> f64 {
    let counts_a = token_counts(a);
    let counts_b = token_counts(b);
    if counts_a.is_empty() || counts_b.is_empty() {
        return 0.0;
    }

    let dot: f64 = counts_a
        .iter()
        .filter_map(|(token, weight)| counts_b.get(token).map(|other| weight * other))
        .sum();
    let norm_a: f64 = counts_a.values().map(|w| w * w).sum::<f64>().sqrt();
    let norm_b: f64 = counts_b.values().map(|w| w * w).sum::<f64>().sqrt();

    dot / (norm_a * norm_b)
}
