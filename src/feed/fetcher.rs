use crate::feed::parser::{parse_feed, ParsedEntry};
use crate::storage::{Database, Feed, NewArticle};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const MAX_RETRIES: u32 = 3;
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors covering the full lifecycle of a feed fetch: network issues,
/// HTTP errors, parsing failures, and database problems.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    #[error("Response too large")]
    ResponseTooLarge,
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Outcome of a single feed fetch: the feed id for correlation and
/// either the count of new articles stored or the error.
pub struct FetchResult {
    pub feed_id: i64,
    pub result: Result<usize, FetchError>,
}

/// Knobs for a refresh run, taken from [`crate::config::Config`].
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Discard entries published more than this many hours ago.
    pub lookback_hours: u64,
    /// Keep at most this many entries per feed, newest first (0 = all).
    pub max_per_feed: usize,
    /// Maximum concurrent feed fetches.
    pub concurrency: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            lookback_hours: 24,
            max_per_feed: 15,
            concurrency: 10,
        }
    }
}

/// Refreshes all feeds concurrently.
///
/// Fetches feeds in parallel with a bounded pool, parses each feed and
/// upserts new articles. Feeds with 5+ consecutive failures are skipped
/// (circuit breaker) until a successful fetch resets the counter. Feed
/// error statuses are batch-updated in one transaction afterwards.
pub async fn refresh_all(
    db: Database,
    client: reqwest::Client,
    feeds: Arc<Vec<Feed>>,
    options: FetchOptions,
) -> Vec<FetchResult> {
    if feeds.is_empty() {
        return Vec::new();
    }

    let active_feeds: Vec<_> = feeds
        .iter()
        .filter(|f| f.consecutive_failures < Database::CIRCUIT_BREAKER_THRESHOLD)
        .cloned()
        .collect();

    let skipped = feeds.len() - active_feeds.len();
    if skipped > 0 {
        tracing::info!(
            skipped = skipped,
            threshold = Database::CIRCUIT_BREAKER_THRESHOLD,
            "Skipping feeds due to consecutive failures"
        );
    }

    if active_feeds.is_empty() {
        return Vec::new();
    }

    let results: Vec<FetchResult> = stream::iter(active_feeds.into_iter())
        .map(|feed| {
            let db = db.clone();
            let client = client.clone();

            async move {
                let feed_id = feed.id;
                let result = fetch_one(&db, &client, &feed, options).await;

                if result.is_err() {
                    match db.increment_feed_failures(feed_id).await {
                        Ok(failures) => {
                            if failures >= Database::CIRCUIT_BREAKER_THRESHOLD {
                                tracing::info!(
                                    feed_id = feed_id,
                                    title = %feed.title,
                                    failures = failures,
                                    "Feed circuit breaker tripped - skipped until a successful fetch"
                                );
                            }
                        }
                        Err(db_err) => {
                            tracing::warn!(
                                feed_id = feed_id,
                                error = %db_err,
                                "Failed to increment feed failure count"
                            );
                        }
                    }
                }

                FetchResult { feed_id, result }
            }
        })
        .buffer_unordered(options.concurrency.max(1))
        .collect()
        .await;

    // Batch update all feed error statuses in a single transaction
    let updates: Vec<(i64, Option<String>)> = results
        .iter()
        .map(|r| {
            let error = match &r.result {
                Ok(_) => None,
                Err(e) => Some(e.to_string()),
            };
            (r.feed_id, error)
        })
        .collect();

    if let Err(e) = db.batch_set_feed_errors(&updates).await {
        tracing::warn!(error = %e, "Failed to batch update feed error statuses");
    }

    results
}

async fn fetch_one(
    db: &Database,
    client: &reqwest::Client,
    feed: &Feed,
    options: FetchOptions,
) -> Result<usize, FetchError> {
    let mut retry_count = 0;

    let bytes = loop {
        let response = tokio::time::timeout(FETCH_TIMEOUT, client.get(&feed.url).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        // Rate limiting: exponential backoff then give up
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            if retry_count >= MAX_RETRIES {
                return Err(FetchError::RateLimited(MAX_RETRIES));
            }

            let delay_secs = 2u64.pow(retry_count); // 2s, 4s, 8s
            tracing::warn!(
                feed = %feed.url,
                retry = retry_count,
                delay_secs = delay_secs,
                "Rate limited, backing off"
            );
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            retry_count += 1;
            continue;
        }

        // Server errors (5xx) also retry with backoff
        if response.status().is_server_error() {
            if retry_count >= MAX_RETRIES {
                return Err(FetchError::HttpStatus(response.status().as_u16()));
            }

            let delay_secs = 2u64.pow(retry_count);
            tracing::warn!(
                feed = %feed.url,
                status = %response.status(),
                retry = retry_count,
                delay_secs = delay_secs,
                "Server error, retrying after delay"
            );
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            retry_count += 1;
            continue;
        }

        // 4xx errors fail immediately
        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        match read_limited_bytes(response, MAX_FEED_SIZE).await {
            Ok(bytes) => break bytes,
            Err(FetchError::IncompleteResponse { expected, received }) => {
                if retry_count >= MAX_RETRIES {
                    return Err(FetchError::IncompleteResponse { expected, received });
                }

                let delay_secs = 2u64.pow(retry_count);
                tracing::debug!(
                    feed = %feed.url,
                    expected = expected,
                    received = received,
                    delay_secs = delay_secs,
                    "Retrying incomplete download"
                );
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                retry_count += 1;
                continue;
            }
            Err(e) => return Err(e),
        }
    };

    let entries = parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;
    let selected = select_entries(entries, options);

    let articles: Vec<NewArticle> = selected
        .into_iter()
        .map(|e| NewArticle {
            guid: e.guid,
            title: e.title,
            url: e.url,
            published: e.published,
            summary: e.summary,
        })
        .collect();

    // Clear error, reset failures, insert articles, stamp last_fetched,
    // all in one transaction.
    let count = db
        .complete_feed_refresh(feed.id, &articles)
        .await
        .map_err(|e| FetchError::Database(e.to_string()))?;

    Ok(count)
}

/// Applies the lookback window and the per-feed cap.
///
/// Entries without a published date are kept (the window can't be
/// applied) and sort as oldest.
fn select_entries(mut entries: Vec<ParsedEntry>, options: FetchOptions) -> Vec<ParsedEntry> {
    let cutoff = chrono::Utc::now().timestamp() - (options.lookback_hours as i64) * 3600;
    entries.retain(|e| match e.published {
        Some(ts) => ts > cutoff,
        None => true,
    });

    if options.max_per_feed > 0 && entries.len() > options.max_per_feed {
        entries.sort_by_key(|e| std::cmp::Reverse(e.published.unwrap_or(i64::MIN)));
        entries.truncate(options.max_per_feed);
    }

    entries
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: Content-Length already over the limit
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    // Fewer bytes than Content-Length means the transfer was cut short;
    // callers retry with backoff.
    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
