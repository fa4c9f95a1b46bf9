use anyhow::Result;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{DatabaseError, Feed, NewArticle};
use crate::feed::FeedSubscription;

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Sync feeds from a subscriptions import (upsert by URL).
    ///
    /// Existing feeds keep their fetch state; title, category, and html_url
    /// are refreshed from the import. Feeds absent from the import are left
    /// in place so their stored articles survive.
    pub async fn sync_feeds(&self, feeds: &[FeedSubscription]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for feed in feeds {
            sqlx::query(
                r#"
                INSERT INTO feeds (title, url, html_url, category)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(url) DO UPDATE SET
                    title = excluded.title,
                    html_url = excluded.html_url,
                    category = excluded.category
            "#,
            )
            .bind(&feed.title)
            .bind(&feed.url)
            .bind(&feed.html_url)
            .bind(&feed.category)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Get all feeds, ordered by title.
    pub async fn list_feeds(&self) -> Result<Vec<Feed>> {
        let feeds = sqlx::query_as::<_, Feed>(
            r#"
            SELECT id, title, url, html_url, category, last_fetched, error,
                   consecutive_failures
            FROM feeds
            ORDER BY title
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(feeds)
    }

    /// Set or clear the error status for a feed
    pub async fn set_feed_error(&self, feed_id: i64, error: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE feeds SET error = ? WHERE id = ?")
            .bind(error)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Batch update feed error statuses in a single transaction.
    ///
    /// One bulk UPDATE with a CASE expression instead of N round-trips.
    /// `None` clears the error.
    pub async fn batch_set_feed_errors(&self, updates: &[(i64, Option<String>)]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("UPDATE feeds SET error = CASE id ");

        for (feed_id, error) in updates {
            builder.push("WHEN ");
            builder.push_bind(*feed_id);
            builder.push(" THEN ");
            builder.push_bind(error.as_deref());
            builder.push(" ");
        }

        builder.push("END WHERE id IN (");
        let mut separated = builder.separated(", ");
        for (feed_id, _) in updates {
            separated.push_bind(*feed_id);
        }
        separated.push_unseparated(")");

        let mut tx = self.pool.begin().await?;
        builder.build().execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(())
    }

    // ========================================================================
    // Circuit Breaker Operations
    // ========================================================================

    /// Threshold for consecutive failures before a feed is skipped
    pub const CIRCUIT_BREAKER_THRESHOLD: i64 = 5;

    /// Increment consecutive failure count for a feed.
    ///
    /// Returns the new failure count. When it reaches
    /// [`Self::CIRCUIT_BREAKER_THRESHOLD`], bulk refreshes skip the feed
    /// until a successful fetch resets the counter.
    pub async fn increment_feed_failures(&self, feed_id: i64) -> Result<i64, DatabaseError> {
        let result: (i64,) = sqlx::query_as(
            "UPDATE feeds SET consecutive_failures = consecutive_failures + 1
             WHERE id = ? RETURNING consecutive_failures",
        )
        .bind(feed_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(result.0)
    }

    /// Complete a feed refresh atomically: clear the error, reset the
    /// circuit breaker, insert new articles, stamp last_fetched.
    ///
    /// Articles are insert-only (`INSERT OR IGNORE`): a guid that already
    /// exists keeps its extracted content and summaries. Returns the number
    /// of newly inserted articles.
    pub async fn complete_feed_refresh(
        &self,
        feed_id: i64,
        articles: &[NewArticle],
    ) -> Result<usize, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE feeds SET error = NULL, consecutive_failures = 0, last_fetched = ? WHERE id = ?",
        )
        .bind(now)
        .bind(feed_id)
        .execute(&mut *tx)
        .await?;

        const BATCH_SIZE: usize = 50;
        let mut total_inserted: usize = 0;

        for chunk in articles.chunks(BATCH_SIZE) {
            let mut insert_builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO articles (feed_id, guid, title, url, published, summary, fetched_at) ",
            );

            insert_builder.push_values(chunk, |mut b, article| {
                b.push_bind(feed_id)
                    .push_bind(&article.guid)
                    .push_bind(&article.title)
                    .push_bind(&article.url)
                    .push_bind(article.published)
                    .push_bind(&article.summary)
                    .push_bind(now);
            });

            insert_builder.build().execute(&mut *tx).await?;

            // changes() counts only the rows the INSERT actually added
            let changes: (i64,) = sqlx::query_as("SELECT changes()")
                .fetch_one(&mut *tx)
                .await?;
            total_inserted += changes.0 as usize;
        }

        tx.commit().await?;

        Ok(total_inserted)
    }
}
