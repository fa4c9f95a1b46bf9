//! End-to-end run: refresh feeds, extract and summarize new articles,
//! render and store the daily digest.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::content::Extractor;
use crate::feed::{refresh_all, FetchOptions};
use crate::storage::{Article, ArticleWithFeed, Database};
use crate::summarize::{render_digest, DigestArticle, Summarizer};
use crate::util::{atomic_write, validate_url};

/// Parallel article extractions per run. Summarization rides along in
/// the same task, so this also bounds in-flight model calls.
const EXTRACTION_CONCURRENCY: usize = 4;

/// Articles picked up per summarization pass. A backlog larger than
/// this drains over subsequent runs.
const SUMMARIZE_BATCH: i64 = 200;

/// Counts from one pipeline run, for logging and the CLI summary line.
#[derive(Debug, Default)]
pub struct RunReport {
    pub feeds_refreshed: usize,
    pub feeds_failed: usize,
    pub new_articles: usize,
    pub summarized: usize,
    pub digest_articles: usize,
    pub digest_path: Option<PathBuf>,
}

pub struct Pipeline {
    db: Database,
    client: reqwest::Client,
    extractor: Extractor,
    summarizer: Summarizer,
    fetch_options: FetchOptions,
    digest_dir: PathBuf,
}

impl Pipeline {
    pub fn new(config: &Config, config_dir: &Path, db: Database) -> Result<Self> {
        // No global timeout on the shared client: the fetcher, the
        // extractor, and the provider each enforce their own budget.
        let client = reqwest::Client::builder()
            .user_agent(concat!("newsbrief/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        let extractor = Extractor::new(
            client.clone(),
            config.reader_base_url.clone(),
            config.reader_api_key(),
        );

        // Keyless operation against the default endpoint would fail on
        // every article, so go straight to the extractive fallback. A
        // custom endpoint without a key is a local model and stays hosted.
        let key = config.summarizer_api_key();
        let custom_endpoint =
            config.summarizer.api_base_url != crate::config::SummarizerConfig::default().api_base_url;
        let provider = if key.is_some() || custom_endpoint {
            Some(crate::summarize::ChatProvider::new(
                client.clone(),
                config.summarizer.api_base_url.clone(),
                config.summarizer.model.clone(),
                config.summarizer.temperature,
                std::time::Duration::from_secs(config.summarizer.timeout_seconds),
                key,
            ))
        } else {
            tracing::info!("No summarizer API key configured; using extractive summaries");
            None
        };
        let summarizer = Summarizer::new(provider, config.summarizer.max_input_chars);

        Ok(Self {
            db,
            client,
            extractor,
            summarizer,
            fetch_options: FetchOptions {
                lookback_hours: config.lookback_hours,
                max_per_feed: config.max_articles_per_feed as usize,
                concurrency: config.fetch_concurrency,
            },
            digest_dir: config_dir.join("digests"),
        })
    }

    /// One full cycle: refresh, summarize, digest for today (UTC).
    pub async fn run_once(&self) -> Result<RunReport> {
        let mut report = self.refresh_and_summarize().await?;

        let today = chrono::Utc::now().date_naive();
        let (digest, count) = self.build_digest(today).await?;
        self.db
            .upsert_digest(today, &digest, count as i64)
            .await
            .context("Failed to store digest")?;
        report.digest_articles = count;
        report.digest_path = Some(self.write_digest_file(today, &digest)?);

        tracing::info!(
            feeds = report.feeds_refreshed,
            failed = report.feeds_failed,
            new_articles = report.new_articles,
            summarized = report.summarized,
            digest_articles = report.digest_articles,
            "Pipeline run complete"
        );
        Ok(report)
    }

    /// Refresh and summarize without touching the digest. The `watch`
    /// scheduler runs this on the refresh interval; the digest is only
    /// rendered at digest time.
    pub async fn refresh_and_summarize(&self) -> Result<RunReport> {
        let mut report = RunReport::default();
        self.refresh_feeds(&mut report).await?;
        report.summarized = self.summarize_pending().await?;
        Ok(report)
    }

    async fn refresh_feeds(&self, report: &mut RunReport) -> Result<()> {
        let feeds = self.db.list_feeds().await.context("Failed to list feeds")?;
        if feeds.is_empty() {
            tracing::warn!("No feeds configured; import subscriptions first");
            return Ok(());
        }

        let results = refresh_all(
            self.db.clone(),
            self.client.clone(),
            Arc::new(feeds),
            self.fetch_options,
        )
        .await;

        for result in &results {
            match &result.result {
                Ok(count) => report.new_articles += count,
                Err(e) => {
                    report.feeds_failed += 1;
                    tracing::warn!(feed_id = result.feed_id, error = %e, "Feed refresh failed");
                }
            }
        }
        report.feeds_refreshed = results.len();
        Ok(())
    }

    /// Extracts and summarizes articles that don't have a summary yet.
    /// Failures degrade per article: extraction errors fall back to the
    /// feed-provided summary text, and articles with nothing to work from
    /// are skipped until more content arrives.
    async fn summarize_pending(&self) -> Result<usize> {
        let pending = self
            .db
            .unsummarized_articles(SUMMARIZE_BATCH)
            .await
            .context("Failed to query unsummarized articles")?;

        if pending.is_empty() {
            return Ok(0);
        }
        tracing::info!(count = pending.len(), "Summarizing articles");

        let summarized: usize = stream::iter(pending.into_iter())
            .map(|article| async move {
                match self.summarize_one(&article).await {
                    Ok(done) => usize::from(done),
                    Err(e) => {
                        tracing::warn!(
                            article_id = article.id,
                            title = %article.title,
                            error = %e,
                            "Failed to summarize article"
                        );
                        0
                    }
                }
            })
            .buffer_unordered(EXTRACTION_CONCURRENCY)
            .collect::<Vec<usize>>()
            .await
            .into_iter()
            .sum();

        Ok(summarized)
    }

    async fn summarize_one(&self, article: &Article) -> Result<bool> {
        let content = match &article.content {
            Some(existing) => Some(existing.clone()),
            None => {
                let extracted = self.extract_content(article).await;
                if let Some(text) = &extracted {
                    self.db.set_article_content(article.id, text).await?;
                }
                extracted
            }
        };

        // Fall back to the feed summary when there is no full text
        let text = content.or_else(|| article.summary.clone());
        let Some(text) = text else {
            tracing::debug!(article_id = article.id, "No content to summarize, skipping");
            return Ok(false);
        };

        match self.summarizer.summarize(&article.title, &text).await {
            Some(summary) => {
                self.db
                    .set_article_summary(article.id, &summary.text, summary.method.as_str())
                    .await?;
                Ok(true)
            }
            None => {
                // Too short for a summary; store the text itself so the
                // article doesn't stay pending forever
                self.db
                    .set_article_summary(article.id, text.trim(), "verbatim")
                    .await?;
                Ok(true)
            }
        }
    }

    async fn extract_content(&self, article: &Article) -> Option<String> {
        let url = article.url.as_deref()?;
        if let Err(e) = validate_url(url) {
            tracing::debug!(article_id = article.id, url = %url, error = %e, "Skipping extraction for invalid URL");
            return None;
        }

        match self.extractor.extract(url).await {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(article_id = article.id, url = %url, error = %e, "Content extraction failed");
                None
            }
        }
    }

    /// Renders the digest for `date` from stored articles.
    pub async fn build_digest(&self, date: NaiveDate) -> Result<(String, usize)> {
        let articles = self
            .db
            .articles_published_on(date)
            .await
            .context("Failed to query articles for digest")?;

        let digest_articles: Vec<DigestArticle> =
            articles.into_iter().map(to_digest_article).collect();

        let digest = render_digest(date, &digest_articles);
        Ok((digest, digest_articles.len()))
    }

    fn write_digest_file(&self, date: NaiveDate, digest: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.digest_dir).with_context(|| {
            format!(
                "Failed to create digest directory: {}",
                self.digest_dir.display()
            )
        })?;
        let path = self
            .digest_dir
            .join(format!("digest_{}.md", date.format("%Y-%m-%d")));
        atomic_write(&path, digest.as_bytes())
            .with_context(|| format!("Failed to write digest: {}", path.display()))?;
        Ok(path)
    }
}

fn to_digest_article(article: ArticleWithFeed) -> DigestArticle {
    let summary = article
        .ai_summary
        .or(article.summary)
        .unwrap_or_else(|| "(no summary available)".to_string());
    DigestArticle {
        title: article.title,
        url: article.url,
        category: article.category,
        feed_title: article.feed_title,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_article_prefers_generated_summary() {
        let article = ArticleWithFeed {
            id: 1,
            title: "T".into(),
            url: None,
            published: Some(0),
            summary: Some("feed summary".into()),
            ai_summary: Some("generated summary".into()),
            feed_title: "Feed".into(),
            category: "news".into(),
        };
        assert_eq!(to_digest_article(article).summary, "generated summary");
    }

    #[test]
    fn digest_article_falls_back_to_feed_summary() {
        let article = ArticleWithFeed {
            id: 1,
            title: "T".into(),
            url: None,
            published: Some(0),
            summary: Some("feed summary".into()),
            ai_summary: None,
            feed_title: "Feed".into(),
            category: "news".into(),
        };
        assert_eq!(to_digest_article(article).summary, "feed summary");
    }
}
