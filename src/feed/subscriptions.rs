//! Subscription loading: OPML (preferred) or the legacy JSON feed list.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use super::opml;

/// A feed subscription with its display metadata and category.
#[derive(Debug, Clone)]
pub struct FeedSubscription {
    pub title: String,
    /// URL of the RSS/Atom XML. Validated at parse time: HTTP(S) only,
    /// no localhost or private ranges.
    pub url: String,
    pub html_url: Option<String>,
    /// Normalized category identifier (lowercase, underscores).
    pub category: String,
    pub description: Option<String>,
}

/// Legacy JSON config: `{"feeds": [{"url", "category", "title", ...}]}`.
#[derive(Debug, Deserialize)]
struct JsonFeedList {
    feeds: Vec<JsonFeed>,
}

#[derive(Debug, Deserialize)]
struct JsonFeed {
    url: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Loads subscriptions from a file, dispatching on the extension:
/// `.opml`/`.xml` parse as OPML, `.json` as the legacy feed list.
pub async fn load_subscriptions(path: &Path) -> Result<Vec<FeedSubscription>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "opml" | "xml" => {
            let path_str = path
                .to_str()
                .context("Invalid UTF-8 in subscriptions path")?;
            opml::parse(path_str).await
        }
        "json" => load_json(path).await,
        other => bail!(
            "Unsupported subscriptions file '{}': expected .opml, .xml, or .json",
            if other.is_empty() { path.display().to_string() } else { other.to_string() }
        ),
    }
}

async fn load_json(path: &Path) -> Result<Vec<FeedSubscription>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read feed list: {}", path.display()))?;
    let list: JsonFeedList =
        serde_json::from_str(&content).context("Invalid JSON feed list")?;

    let feeds = list
        .feeds
        .into_iter()
        .filter_map(|f| {
            if let Err(e) = crate::util::validate_url(&f.url) {
                tracing::warn!(url = %f.url, error = %e, "Skipping invalid feed URL");
                return None;
            }
            let category = f
                .category
                .as_deref()
                .map(opml::normalize_category)
                .unwrap_or_else(|| opml::DEFAULT_CATEGORY.to_string());
            Some(FeedSubscription {
                title: f.title.unwrap_or_else(|| f.url.clone()),
                url: f.url,
                html_url: None,
                category,
                description: f.description,
            })
        })
        .collect();

    Ok(feeds)
}

/// Per-category subscription counts, for the `stats` command.
#[derive(Debug)]
pub struct FeedStatistics {
    pub total_feeds: usize,
    /// category → feed titles, sorted by category name.
    pub categories: BTreeMap<String, Vec<String>>,
}

impl FeedStatistics {
    pub fn from_subscriptions(feeds: &[FeedSubscription]) -> Self {
        let mut categories: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for feed in feeds {
            categories
                .entry(feed.category.clone())
                .or_default()
                .push(feed.title.clone());
        }
        Self {
            total_feeds: feeds.len(),
            categories,
        }
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }
}

impl std::fmt::Display for FeedStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Total feeds: {}", self.total_feeds)?;
        writeln!(f, "Categories: {}", self.category_count())?;
        for (category, titles) in &self.categories {
            writeln!(f, "  {}: {} feeds", category, titles.len())?;
            for title in titles.iter().take(3) {
                writeln!(f, "    - {}", title)?;
            }
            if titles.len() > 3 {
                writeln!(f, "    ... and {} more", titles.len() - 3)?;
            }
        }
        Ok(())
    }
}
