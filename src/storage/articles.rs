use anyhow::Result;
use chrono::NaiveDate;

use super::schema::Database;
use super::types::{Article, ArticleWithFeed};

impl Database {
    // ========================================================================
    // Article Operations
    // ========================================================================

    /// Get articles that have no generated summary yet, oldest fetch first,
    /// capped at `limit`.
    pub async fn unsummarized_articles(&self, limit: i64) -> Result<Vec<Article>> {
        let articles = sqlx::query_as::<_, Article>(
            r#"
            SELECT id, feed_id, guid, title, url, published, summary, content,
                   ai_summary, summary_method, fetched_at
            FROM articles
            WHERE ai_summary IS NULL
            ORDER BY fetched_at ASC
            LIMIT ?
        "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(articles)
    }

    /// Store the extracted full text of an article
    pub async fn set_article_content(&self, article_id: i64, content: &str) -> Result<()> {
        sqlx::query("UPDATE articles SET content = ? WHERE id = ?")
            .bind(content)
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Store a generated summary and the method that produced it
    pub async fn set_article_summary(
        &self,
        article_id: i64,
        summary: &str,
        method: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE articles SET ai_summary = ?, summary_method = ? WHERE id = ?")
            .bind(summary)
            .bind(method)
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Get articles published on `date` (UTC day), joined with their feed's
    /// title and category, ordered by category then published time.
    pub async fn articles_published_on(&self, date: NaiveDate) -> Result<Vec<ArticleWithFeed>> {
        let start = date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(0);
        let end = start + 86_400;

        let articles = sqlx::query_as::<_, ArticleWithFeed>(
            r#"
            SELECT a.id, a.title, a.url, a.published, a.summary, a.ai_summary,
                   f.title AS feed_title, f.category
            FROM articles a
            JOIN feeds f ON f.id = a.feed_id
            WHERE a.published >= ? AND a.published < ?
            ORDER BY f.category, a.published DESC
        "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(articles)
    }

    /// Total number of stored articles
    pub async fn count_articles(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Number of articles still waiting for a summary
    pub async fn count_unsummarized(&self) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM articles WHERE ai_summary IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedSubscription;
    use crate::storage::NewArticle;

    async fn db_with_feed(category: &str) -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        db.sync_feeds(&[FeedSubscription {
            title: "Test Feed".into(),
            url: format!("https://example.com/{}", category),
            html_url: None,
            category: category.into(),
            description: None,
        }])
        .await
        .unwrap();
        let id = db.list_feeds().await.unwrap()[0].id;
        (db, id)
    }

    fn article_at(guid: &str, published: i64) -> NewArticle {
        NewArticle {
            guid: guid.to_string(),
            title: format!("Article {}", guid),
            url: None,
            published: Some(published),
            summary: Some("feed summary".to_string()),
        }
    }

    #[tokio::test]
    async fn summary_roundtrip_clears_pending() {
        let (db, feed_id) = db_with_feed("news").await;
        db.complete_feed_refresh(feed_id, &[article_at("1", 1000), article_at("2", 2000)])
            .await
            .unwrap();

        let pending = db.unsummarized_articles(100).await.unwrap();
        assert_eq!(pending.len(), 2);

        db.set_article_summary(pending[0].id, "a summary", "extractive")
            .await
            .unwrap();

        assert_eq!(db.count_unsummarized().await.unwrap(), 1);
        let remaining = db.unsummarized_articles(100).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_ne!(remaining[0].id, pending[0].id);
    }

    #[tokio::test]
    async fn content_stored_and_kept_across_refresh() {
        let (db, feed_id) = db_with_feed("news").await;
        db.complete_feed_refresh(feed_id, &[article_at("1", 1000)])
            .await
            .unwrap();
        let id = db.unsummarized_articles(1).await.unwrap()[0].id;

        db.set_article_content(id, "full text").await.unwrap();
        // Same guid arrives again; the stored row must be untouched
        db.complete_feed_refresh(feed_id, &[article_at("1", 1000)])
            .await
            .unwrap();

        let article = db.unsummarized_articles(1).await.unwrap();
        assert_eq!(article[0].content.as_deref(), Some("full text"));
    }

    #[tokio::test]
    async fn published_on_filters_by_utc_day() {
        let (db, feed_id) = db_with_feed("news").await;
        let date = NaiveDate::from_ymd_opt(2026, 8, 27).unwrap();
        let midnight = date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();

        db.complete_feed_refresh(
            feed_id,
            &[
                article_at("on-day", midnight + 3600),
                article_at("day-before", midnight - 1),
                article_at("day-after", midnight + 86_400),
            ],
        )
        .await
        .unwrap();

        let articles = db.articles_published_on(date).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Article on-day");
        assert_eq!(articles[0].category, "news");
        assert_eq!(articles[0].feed_title, "Test Feed");
    }

    #[tokio::test]
    async fn count_articles_total() {
        let (db, feed_id) = db_with_feed("news").await;
        db.complete_feed_refresh(feed_id, &[article_at("1", 1), article_at("2", 2)])
            .await
            .unwrap();
        assert_eq!(db.count_articles().await.unwrap(), 2);
    }
}
