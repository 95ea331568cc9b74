//! RSS 2.0 / Atom feed fetching and parsing.

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;

use crate::error::{Error, Result};

use super::classify_status;

/// One parsed feed entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub published: Option<DateTime<Utc>>,
}

/// Fetches registered feed URLs and parses both RSS `<item>` and Atom
/// `<entry>` payloads.
pub struct RssFetcher {
    http: Client,
}

impl RssFetcher {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// Fetch and parse one feed.
    pub async fn fetch(&self, source_name: &str, url: &str) -> Result<Vec<FeedItem>> {
        let response = self
            .http
            .get(url)
            .header("user-agent", "vigil/0.1 (+https://github.com/rand/vigil)")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    Error::transient_fetch(source_name, e.to_string())
                } else {
                    Error::permanent_fetch(source_name, e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(source_name, status));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::transient_fetch(source_name, e.to_string()))?;

        parse_feed(&body)
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Parse an RSS or Atom document into feed items.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<FeedItem> = None;
    let mut text_buffer = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();

                if name == "item" || name == "entry" {
                    current = Some(FeedItem {
                        title: String::new(),
                        link: String::new(),
                        summary: String::new(),
                        published: None,
                    });
                } else if name == "link" {
                    // Atom links carry the URL in an href attribute.
                    if let Some(item) = current.as_mut() {
                        let mut href = None;
                        let mut rel_alternate = true;
                        for attr in e.attributes().flatten() {
                            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                            let value = String::from_utf8_lossy(&attr.value).to_string();
                            match key.as_str() {
                                "href" => href = Some(value),
                                "rel" => rel_alternate = value == "alternate",
                                _ => {}
                            }
                        }
                        if let Some(href) = href {
                            if rel_alternate && item.link.is_empty() {
                                item.link = href;
                            }
                        }
                    }
                }
                text_buffer.clear();
            }
            Ok(Event::Text(e)) => {
                text_buffer = e.unescape().unwrap_or_default().to_string();
            }
            Ok(Event::CData(e)) => {
                text_buffer = String::from_utf8_lossy(&e.into_inner()).to_string();
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();

                if name == "item" || name == "entry" {
                    if let Some(item) = current.take() {
                        if !item.link.is_empty() || !item.title.is_empty() {
                            items.push(item);
                        }
                    }
                } else if let Some(item) = current.as_mut() {
                    match name.as_str() {
                        "title" => item.title = text_buffer.clone(),
                        "link" if item.link.is_empty() => item.link = text_buffer.clone(),
                        "description" | "summary" | "content" | "content:encoded" => {
                            if item.summary.is_empty() {
                                item.summary = text_buffer.clone();
                            }
                        }
                        "pubDate" | "published" | "updated" | "dc:date" => {
                            if item.published.is_none() {
                                item.published = parse_date(&text_buffer);
                            }
                        }
                        _ => {}
                    }
                }
                text_buffer.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Parse(format!("feed XML error: {}", e))),
            _ => {}
        }
    }

    Ok(items)
}
