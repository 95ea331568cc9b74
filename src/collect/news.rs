//! News API strategy (newsapi.org `everything` shape).

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::error::{Error, Result};

use super::classify_status;

const SOURCE_NAME: &str = "news_api";

/// One news API article.
#[derive(Debug, Clone, PartialEq)]
pub struct NewsArticle {
    pub title: String,
    pub url: String,
    pub description: String,
    pub published: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    articles: Vec<NewsItem>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsItem {
    #[serde(default)]
    title: Option<String>,
    url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
}

/// Client for the configured news API.
pub struct NewsApiClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl NewsApiClient {
    const DEFAULT_BASE_URL: &'static str = "https://newsapi.org/v2/everything";

    pub fn new(http: Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Fetch last-window articles for one keyword cohort.
    pub async fn everything(&self, query: &str, from: DateTime<Utc>) -> Result<Vec<NewsArticle>> {
        let response = self
            .http
            .get(&self.base_url)
            .header("x-api-key", &self.api_key)
            .query(&[
                ("q", query),
                ("from", &from.to_rfc3339()),
                ("sortBy", "publishedAt"),
                ("pageSize", "20"),
                ("language", "en"),
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

        let parsed: NewsResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Parse(format!("news response: {}", e)))?;

        if parsed.status != "ok" {
            return Err(Error::permanent_fetch(
                SOURCE_NAME,
                parsed.message.unwrap_or_else(|| "api status not ok".to_string()),
            ));
        }

        Ok(parsed
            .articles
            .into_iter()
            .map(|item| NewsArticle {
                title: item.title.unwrap_or_default(),
                url: item.url,
                description: item
                    .description
                    .or(item.content)
                    .unwrap_or_default(),
                published: item
                    .published_at
                    .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
                    .map(|dt| dt.with_timezone(&Utc)),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_news_payload() {
        let body = r#"{
            "status": "ok",
            "articles": [
                {
                    "title": "Clashes in border town",
                    "url": "https://example.com/clash",
                    "description": "Fighting broke out...",
                    "publishedAt": "2024-03-12T08:00:00Z"
                }
            ]
        }"#;
        let parsed: NewsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.status, "ok");
        assert_eq!(parsed.articles.len(), 1);
        assert_eq!(parsed.articles[0].url, "https://example.com/clash");
    }

    #[test]
    fn test_null_fields_tolerated() {
        let body = r#"{
            "status": "ok",
            "articles": [
                {"title": null, "url": "https://example.com/x", "description": null, "publishedAt": null}
            ]
        }"#;
        let parsed: NewsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.articles.len(), 1);
        assert!(parsed.articles[0].title.is_none());
    }
}
