//! URL and content-hash deduplication within a rolling window.
//!
//! The index is process-wide and in-memory; the persistent uniqueness
//! constraint on `articles_raw.content_hash` is the backstop, so a stale
//! read that lets a duplicate through is tolerated.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::model::Article;

/// Query parameters stripped during canonicalization.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid", "ref"];

/// Canonicalize a URL for dedup comparison: lowercase scheme and host,
/// strip the fragment, drop tracking query parameters, collapse trailing
/// slashes.
pub fn canonicalize_url(url: &str) -> String {
    let url = url.trim();

    // Split off the fragment first; it never affects identity.
    let url = url.split('#').next().unwrap_or(url);

    let (scheme, rest) = match url.split_once("://") {
        Some((s, r)) => (s.to_lowercase(), r),
        None => ("https".to_string(), url),
    };

    let (authority_and_path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };

    let (host, path) = match authority_and_path.split_once('/') {
        Some((h, p)) => (h.to_lowercase(), format!("/{}", p)),
        None => (authority_and_path.to_lowercase(), String::new()),
    };

    let path = path.trim_end_matches('/').to_string();

    let query = query
        .map(|q| {
            q.split('&')
                .filter(|pair| {
                    let key = pair.split('=').next().unwrap_or("").to_lowercase();
                    !key.starts_with("utm_") && !TRACKING_PARAMS.contains(&key.as_str())
                })
                .collect::<Vec<_>>()
                .join("&")
        })
        .filter(|q| !q.is_empty());

    match query {
        Some(q) => format!("{}://{}{}?{}", scheme, host, path, q),
        None => format!("{}://{}{}", scheme, host, path),
    }
}

/// Normalize body text for hashing: lowercase, whitespace collapsed.
fn normalize_body(body: &str) -> String {
    body.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Content hash: SHA-256 over the canonical URL and normalized body.
pub fn content_hash(url: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonicalize_url(url).as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize_body(body).as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Default)]
struct IndexState {
    urls: HashMap<String, DateTime<Utc>>,
    hashes: HashMap<String, DateTime<Utc>>,
}

/// Rolling-window membership index over canonical URLs and content hashes.
pub struct DedupIndex {
    window: Duration,
    state: Mutex<IndexState>,
}

impl DedupIndex {
    /// Create an index with the given rolling window (default 24h upstream).
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(IndexState::default()),
        }
    }

    /// Preload keys already persisted, so the in-memory index is a
    /// read-through over recent store contents.
    pub fn preload(&self, urls: impl IntoIterator<Item = String>, hashes: impl IntoIterator<Item = String>) {
        let now = Utc::now();
        let mut state = self.state.lock().expect("dedup index poisoned");
        for url in urls {
            state.urls.insert(canonicalize_url(&url), now);
        }
        for hash in hashes {
            state.hashes.insert(hash, now);
        }
    }

    /// O(1) membership test against the canonical URL.
    pub fn seen(&self, url: &str) -> bool {
        let key = canonicalize_url(url);
        let mut state = self.state.lock().expect("dedup index poisoned");
        Self::evict(&mut state, self.window);
        state.urls.contains_key(&key)
    }

    /// O(1) membership test against the content hash.
    pub fn seen_hash(&self, hash: &str) -> bool {
        let mut state = self.state.lock().expect("dedup index poisoned");
        Self::evict(&mut state, self.window);
        state.hashes.contains_key(hash)
    }

    /// Admit the article if neither its URL nor its hash is known,
    /// recording both. Returns false for duplicates.
    pub fn admit(&self, article: &Article) -> bool {
        let url_key = canonicalize_url(&article.url);
        let mut state = self.state.lock().expect("dedup index poisoned");
        Self::evict(&mut state, self.window);

        if state.urls.contains_key(&url_key) || state.hashes.contains_key(&article.content_hash) {
            return false;
        }
        let now = Utc::now();
        state.urls.insert(url_key, now);
        state.hashes.insert(article.content_hash.clone(), now);
        true
    }

    /// Number of distinct hashes currently tracked.
    pub fn len(&self) -> usize {
        let state = self.state.lock().expect("dedup index poisoned");
        state.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict(state: &mut IndexState, window: Duration) {
        let cutoff = Utc::now() - window;
        state.urls.retain(|_, seen_at| *seen_at >= cutoff);
        state.hashes.retain(|_, seen_at| *seen_at >= cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn article(url: &str, body: &str) -> Article {
        Article::new(url, "headline", body, Utc::now(), "src", 1, "q")
    }

    #[test]
    fn test_canonicalize_strips_tracking_and_fragment() {
        let url = "HTTPS://Example.COM/News/story/?utm_source=x&utm_medium=y&id=7#section";
        assert_eq!(
            canonicalize_url(url),
            "https://example.com/News/story?id=7"
        );
    }

    #[test]
    fn test_canonicalize_collapses_trailing_slash() {
        assert_eq!(
            canonicalize_url("https://example.com/a/b/"),
            canonicalize_url("https://example.com/a/b")
        );
    }

    #[test]
    fn test_canonicalize_strips_fbclid_gclid() {
        assert_eq!(
            canonicalize_url("https://example.com/x?fbclid=abc&gclid=def"),
            "https://example.com/x"
        );
    }

    #[test]
    fn test_hash_stable_under_whitespace() {
        let a = content_hash("https://example.com/x", "Ten  soldiers\nwere killed");
        let b = content_hash("https://example.com/x", "ten soldiers were killed");
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_differs_on_body() {
        let a = content_hash("https://example.com/x", "ten soldiers were killed");
        let b = content_hash("https://example.com/x", "twelve soldiers were killed");
        assert_ne!(a, b);
    }

    #[test]
    fn test_admit_rejects_duplicate_url() {
        let index = DedupIndex::new(Duration::hours(24));
        assert!(index.admit(&article("https://example.com/a", "body one")));
        assert!(!index.admit(&article("https://example.com/a/", "body two")));
    }

    #[test]
    fn test_admit_rejects_duplicate_hash() {
        let index = DedupIndex::new(Duration::hours(24));
        assert!(index.admit(&article("https://example.com/a", "same body")));
        // Different URL, identical content.
        assert!(!index.admit(&article("https://mirror.example.org/a", "same  BODY")));
    }

    #[test]
    fn test_preload_acts_as_read_through() {
        let index = DedupIndex::new(Duration::hours(24));
        let stored = article("https://example.com/old", "old body");
        index.preload(
            vec![stored.url.clone()],
            vec![stored.content_hash.clone()],
        );
        assert!(index.seen("https://example.com/old"));
        assert!(index.seen_hash(&stored.content_hash));
        assert!(!index.admit(&stored));
    }

    proptest! {
        #[test]
        fn prop_canonicalize_idempotent(url in "[a-zA-Z0-9:/?&=._#-]{1,80}") {
            let once = canonicalize_url(&url);
            let twice = canonicalize_url(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_hash_whitespace_invariant(body in "[a-z ]{0,60}") {
            let padded = format!("  {}  ", body.replace(' ', "   "));
            prop_assert_eq!(
                content_hash("https://example.com/p", &body),
                content_hash("https://example.com/p", &padded)
            );
        }
    }
}
