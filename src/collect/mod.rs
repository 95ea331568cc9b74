//! Collection fan-out across the search API, news API, and RSS strategies.
//!
//! Concurrency model: one task per source with a global semaphore cap, so
//! per-source concurrency is exactly one while the process never holds
//! more than `max_concurrent_requests` fetches in flight. Articles are
//! emitted into a bounded channel sized at twice the batch size; a slow
//! consumer therefore throttles the fetchers.

pub mod news;
pub mod rss;
pub mod search;

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration as ChronoDuration, Utc};
use futures::future::join_all;
use reqwest::StatusCode;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{sleep, Duration};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{Article, QueryAudit, QueryKind};
use crate::sources::{FetchErrorKind, SourceFilter, SourceKind, SourceRegistry};

pub use news::{NewsApiClient, NewsArticle};
pub use rss::{parse_feed, FeedItem, RssFetcher};
pub use search::{SearchApiClient, SearchResult};

/// Minimum pause after each request, to avoid burstiness.
const INTER_BATCH_DELAY: Duration = Duration::from_millis(200);

/// Keyword cohorts used by the news API strategy in the broad round.
const NEWS_COHORTS: &[&str] = &[
    "military conflict OR armed clashes",
    "missile strike OR airstrike OR shelling",
    "casualties killed OR wounded war",
    "offensive OR invasion OR ceasefire",
];

/// Registry name the search strategy accounts against.
const SEARCH_SOURCE: &str = "google_search";
/// Registry name the news strategy accounts against.
const NEWS_SOURCE: &str = "news_api";

/// Map an HTTP status to the fetch error taxonomy.
pub(crate) fn classify_status(source_name: &str, status: StatusCode) -> Error {
    if status.is_server_error() {
        Error::transient_fetch(source_name, format!("HTTP {}", status))
    } else {
        Error::permanent_fetch(source_name, format!("HTTP {}", status))
    }
}

fn error_kind(error: &Error) -> FetchErrorKind {
    match error {
        Error::Fetch { retryable: true, .. } => FetchErrorKind::Http5xx,
        Error::Fetch { retryable: false, .. } => FetchErrorKind::Http4xx,
        Error::Timeout { .. } => FetchErrorKind::Timeout,
        Error::Parse(_) => FetchErrorKind::Parse,
        _ => FetchErrorKind::Network,
    }
}

/// Retry with exponential backoff (`base_delay * 2^attempt`); only
/// retryable errors are retried, 4xx is terminal.
async fn with_retry<T, Fut>(
    attempts: u32,
    base_delay: Duration,
    mut call: impl FnMut() -> Fut,
) -> Result<T>
where
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < attempts.max(1) => {
                let delay = base_delay * 2u32.saturating_pow(attempt);
                tracing::debug!(attempt, ?delay, "retrying after transient error: {}", err);
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Which strategies participate in a collection pass.
#[derive(Debug, Clone, Copy)]
pub struct StrategySelection {
    pub search: bool,
    pub news: bool,
    pub rss: bool,
}

impl Default for StrategySelection {
    fn default() -> Self {
        Self {
            search: true,
            news: true,
            rss: true,
        }
    }
}

impl StrategySelection {
    /// Parse a CLI selector: `google`, `newsapi`, `rss`, or `all`.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "google" => Self { search: true, news: false, rss: false },
            "newsapi" => Self { search: false, news: true, rss: false },
            "rss" => Self { search: false, news: false, rss: true },
            _ => Self::default(),
        }
    }
}

/// A failed source with its diagnostic, for cycle stats.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectError {
    pub source: String,
    pub message: String,
}

/// Result of one collection pass.
#[derive(Debug, Default)]
pub struct CollectOutcome {
    pub articles: Vec<Article>,
    pub audits: Vec<QueryAudit>,
    pub errors: Vec<CollectError>,
}

/// Collector configuration, derived from the runtime tunables.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub max_concurrent_requests: usize,
    pub batch_size: usize,
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
    pub max_articles: usize,
    pub window_days: u32,
}

impl CollectorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrent_requests: config.tunables.max_concurrent_requests,
            batch_size: config.tunables.batch_size,
            retry_attempts: config.tunables.retry_attempts,
            retry_base_delay: Duration::from_millis(config.tunables.retry_base_delay_ms),
            max_articles: config.tunables.max_articles_per_run,
            window_days: 1,
        }
    }
}

/// Fans generated queries out across the active sources.
pub struct Collector {
    registry: Arc<SourceRegistry>,
    search: Option<Arc<SearchApiClient>>,
    news: Option<Arc<NewsApiClient>>,
    rss: Arc<RssFetcher>,
    config: CollectorConfig,
}

impl Collector {
    pub fn new(registry: Arc<SourceRegistry>, http: reqwest::Client, config: CollectorConfig) -> Self {
        Self {
            registry,
            search: None,
            news: None,
            rss: Arc::new(RssFetcher::new(http)),
            config,
        }
    }

    pub fn with_search(mut self, client: SearchApiClient) -> Self {
        self.search = Some(Arc::new(client));
        self
    }

    pub fn with_news(mut self, client: NewsApiClient) -> Self {
        self.news = Some(Arc::new(client));
        self
    }

    /// Build a collector wired from configuration.
    pub fn from_config(config: &Config, registry: Arc<SourceRegistry>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let mut collector = Self::new(registry, http.clone(), CollectorConfig::from_config(config));
        if !config.search.api_key.is_empty() {
            collector = collector.with_search(SearchApiClient::new(
                http.clone(),
                &config.search.api_key,
                &config.search.engine_id,
            ));
        }
        if !config.news.api_key.is_empty() {
            collector = collector.with_news(NewsApiClient::new(http, &config.news.api_key));
        }
        collector
    }

    /// Run one collection pass. The returned future resolves only after
    /// every fetch task has finished, which is the barrier the dedup index
    /// relies on.
    pub async fn collect(
        &self,
        queries: &[String],
        round: u8,
        selection: StrategySelection,
        deadline: Option<Instant>,
    ) -> CollectOutcome {
        let kind = if round == 1 { QueryKind::Broad } else { QueryKind::Targeted };
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_requests.max(1)));
        let (tx, mut rx) = mpsc::channel::<Article>(self.config.batch_size.max(1) * 2);

        let drain = tokio::spawn(async move {
            let mut buffer = Vec::new();
            while let Some(article) = rx.recv().await {
                buffer.push(article);
            }
            buffer
        });

        let mut tasks = Vec::new();

        if selection.search {
            if let Some(search) = self.search.clone() {
                tasks.push(tokio::spawn(Self::search_task(
                    search,
                    self.registry.clone(),
                    queries.to_vec(),
                    kind,
                    round,
                    self.config.clone(),
                    semaphore.clone(),
                    tx.clone(),
                    deadline,
                )));
            }
        }

        if selection.news {
            if let Some(news) = self.news.clone() {
                let cohorts: Vec<String> = if round == 1 {
                    NEWS_COHORTS.iter().map(|c| c.to_string()).collect()
                } else {
                    queries.to_vec()
                };
                tasks.push(tokio::spawn(Self::news_task(
                    news,
                    self.registry.clone(),
                    cohorts,
                    kind,
                    round,
                    self.config.clone(),
                    semaphore.clone(),
                    tx.clone(),
                    deadline,
                )));
            }
        }

        // Feeds carry no query surface, so the targeted round skips them;
        // the broad round already drained each feed within its rate cap.
        if selection.rss && round == 1 {
            let feeds = self.registry.list(&SourceFilter::kind(SourceKind::Rss)).await;
            for feed in feeds {
                tasks.push(tokio::spawn(Self::rss_task(
                    self.rss.clone(),
                    self.registry.clone(),
                    feed.name.clone(),
                    feed.endpoint.clone(),
                    round,
                    self.config.clone(),
                    semaphore.clone(),
                    tx.clone(),
                    deadline,
                )));
            }
        }

        drop(tx);

        let mut outcome = CollectOutcome::default();
        for task_result in join_all(tasks).await {
            match task_result {
                Ok((audits, errors)) => {
                    outcome.audits.extend(audits);
                    outcome.errors.extend(errors);
                }
                Err(join_err) => outcome.errors.push(CollectError {
                    source: "collector".to_string(),
                    message: format!("task panicked: {}", join_err),
                }),
            }
        }

        let mut articles = drain.await.unwrap_or_default();
        if articles.len() > self.config.max_articles {
            tracing::info!(
                cap = self.config.max_articles,
                fetched = articles.len(),
                "article cap reached, truncating"
            );
            articles.truncate(self.config.max_articles);
        }
        outcome.articles = articles;
        outcome
    }

    fn deadline_passed(deadline: Option<Instant>) -> bool {
        deadline.is_some_and(|d| Instant::now() >= d)
    }

    #[allow(clippy::too_many_arguments)]
    async fn search_task(
        client: Arc<SearchApiClient>,
        registry: Arc<SourceRegistry>,
        queries: Vec<String>,
        kind: QueryKind,
        round: u8,
        config: CollectorConfig,
        semaphore: Arc<Semaphore>,
        tx: mpsc::Sender<Article>,
        deadline: Option<Instant>,
    ) -> (Vec<QueryAudit>, Vec<CollectError>) {
        let mut audits = Vec::new();
        let mut errors = Vec::new();

        for query in queries {
            if Self::deadline_passed(deadline) {
                break;
            }
            if !registry.check_rate_limit(SEARCH_SOURCE).await {
                audits.push(QueryAudit::failure(&query, kind, round, "rate limited"));
                continue;
            }

            let Ok(_permit) = semaphore.acquire().await else { break };

            let result = with_retry(config.retry_attempts, config.retry_base_delay, || {
                client.search(&query, config.window_days)
            })
            .await;

            match result {
                Ok(results) => {
                    registry.record_success(SEARCH_SOURCE, results.len()).await;
                    audits.push(QueryAudit::success(&query, kind, round, results.len()));
                    for hit in results {
                        let article = Article::new(
                            hit.link,
                            hit.title,
                            hit.snippet,
                            Utc::now(),
                            SEARCH_SOURCE,
                            round,
                            &query,
                        );
                        if tx.send(article).await.is_err() {
                            return (audits, errors);
                        }
                    }
                }
                Err(err) => {
                    registry.record_failure(SEARCH_SOURCE, error_kind(&err)).await;
                    audits.push(QueryAudit::failure(&query, kind, round, err.to_string()));
                    errors.push(CollectError {
                        source: SEARCH_SOURCE.to_string(),
                        message: err.to_string(),
                    });
                }
            }

            sleep(INTER_BATCH_DELAY).await;
        }

        (audits, errors)
    }

    #[allow(clippy::too_many_arguments)]
    async fn news_task(
        client: Arc<NewsApiClient>,
        registry: Arc<SourceRegistry>,
        cohorts: Vec<String>,
        kind: QueryKind,
        round: u8,
        config: CollectorConfig,
        semaphore: Arc<Semaphore>,
        tx: mpsc::Sender<Article>,
        deadline: Option<Instant>,
    ) -> (Vec<QueryAudit>, Vec<CollectError>) {
        let mut audits = Vec::new();
        let mut errors = Vec::new();
        let from = Utc::now() - ChronoDuration::days(config.window_days.max(1) as i64);

        for cohort in cohorts {
            if Self::deadline_passed(deadline) {
                break;
            }
            if !registry.check_rate_limit(NEWS_SOURCE).await {
                audits.push(QueryAudit::failure(&cohort, kind, round, "rate limited"));
                continue;
            }

            let Ok(_permit) = semaphore.acquire().await else { break };

            let result = with_retry(config.retry_attempts, config.retry_base_delay, || {
                client.everything(&cohort, from)
            })
            .await;

            match result {
                Ok(results) => {
                    registry.record_success(NEWS_SOURCE, results.len()).await;
                    audits.push(QueryAudit::success(&cohort, kind, round, results.len()));
                    for item in results {
                        let article = Article::new(
                            item.url,
                            item.title,
                            item.description,
                            item.published.unwrap_or_else(Utc::now),
                            NEWS_SOURCE,
                            round,
                            &cohort,
                        );
                        if tx.send(article).await.is_err() {
                            return (audits, errors);
                        }
                    }
                }
                Err(err) => {
                    registry.record_failure(NEWS_SOURCE, error_kind(&err)).await;
                    audits.push(QueryAudit::failure(&cohort, kind, round, err.to_string()));
                    errors.push(CollectError {
                        source: NEWS_SOURCE.to_string(),
                        message: err.to_string(),
                    });
                }
            }

            sleep(INTER_BATCH_DELAY).await;
        }

        (audits, errors)
    }

    #[allow(clippy::too_many_arguments)]
    async fn rss_task(
        fetcher: Arc<RssFetcher>,
        registry: Arc<SourceRegistry>,
        source_name: String,
        endpoint: String,
        round: u8,
        config: CollectorConfig,
        semaphore: Arc<Semaphore>,
        tx: mpsc::Sender<Article>,
        deadline: Option<Instant>,
    ) -> (Vec<QueryAudit>, Vec<CollectError>) {
        let mut errors = Vec::new();

        if Self::deadline_passed(deadline) {
            return (Vec::new(), errors);
        }
        if !registry.check_rate_limit(&source_name).await {
            tracing::debug!(source = %source_name, "rate limited, skipping feed");
            return (Vec::new(), errors);
        }

        let Ok(_permit) = semaphore.acquire().await else {
            return (Vec::new(), errors);
        };

        let result = with_retry(config.retry_attempts, config.retry_base_delay, || {
            fetcher.fetch(&source_name, &endpoint)
        })
        .await;

        match result {
            Ok(items) => {
                registry.record_success(&source_name, items.len()).await;
                let query = format!("rss:{}", source_name);
                for item in items {
                    let article = Article::new(
                        item.link,
                        item.title,
                        item.summary,
                        item.published.unwrap_or_else(Utc::now),
                        &source_name,
                        round,
                        &query,
                    );
                    if tx.send(article).await.is_err() {
                        break;
                    }
                }
            }
            Err(err) => {
                registry.record_failure(&source_name, error_kind(&err)).await;
                tracing::debug!(source = %source_name, "feed fetch failed: {}", err);
                errors.push(CollectError {
                    source: source_name,
                    message: err.to_string(),
                });
            }
        }

        sleep(INTER_BATCH_DELAY).await;
        (Vec::new(), errors)
    }
}
