//! Search API strategy (Google Custom Search JSON shape).

use reqwest::Client;
use serde::Deserialize;

use crate::error::{Error, Result};

use super::classify_status;

const SOURCE_NAME: &str = "google_search";

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

/// Client for the configured search API.
pub struct SearchApiClient {
    http: Client,
    api_key: String,
    engine_id: String,
    base_url: String,
}

impl SearchApiClient {
    const DEFAULT_BASE_URL: &'static str = "https://www.googleapis.com/customsearch/v1";

    pub fn new(http: Client, api_key: impl Into<String>, engine_id: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            engine_id: engine_id.into(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Request one page of results restricted to the last `window_days`
    /// days.
    pub async fn search(&self, query: &str, window_days: u32) -> Result<Vec<SearchResult>> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("dateRestrict", &format!("d{}", window_days.max(1))),
                ("num", "10"),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    Error::transient_fetch(SOURCE_NAME, e.to_string())
                } else {
                    Error::permanent_fetch(SOURCE_NAME, e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(SOURCE_NAME, status));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::transient_fetch(SOURCE_NAME, e.to_string()))?;

        let parsed: SearchResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Parse(format!("search response: {}", e)))?;

        Ok(parsed
            .items
            .into_iter()
            .map(|item| SearchResult {
                title: item.title,
                link: item.link,
                snippet: item.snippet,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_search_payload() {
        let body = r#"{
            "items": [
                {"title": "Strike hits city", "link": "https://example.com/a", "snippet": "Missile strike..."},
                {"title": "Front line update", "link": "https://example.com/b", "snippet": "Troops advanced..."}
            ]
        }"#;
        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(parsed.items[0].link, "https://example.com/a");
    }

    #[test]
    fn test_empty_payload_yields_no_items() {
        let parsed: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.items.is_empty());
    }
}
