use anyhow::Result;
use chrono::NaiveDate;

use super::schema::Database;
use super::types::Digest;

impl Database {
    // ========================================================================
    // Digest Operations
    // ========================================================================

    /// Store or replace the digest for a date. Re-running a day's pipeline
    /// overwrites the previous rendering.
    pub async fn upsert_digest(
        &self,
        date: NaiveDate,
        content: &str,
        article_count: i64,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO daily_digests (date, content, article_count, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(date) DO UPDATE SET
                content = excluded.content,
                article_count = excluded.article_count,
                created_at = excluded.created_at
        "#,
        )
        .bind(date.format("%Y-%m-%d").to_string())
        .bind(content)
        .bind(article_count)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get the stored digest for a date, if one exists
    pub async fn get_digest(&self, date: NaiveDate) -> Result<Option<Digest>> {
        let digest = sqlx::query_as::<_, Digest>(
            r#"
            SELECT id, date, content, article_count, created_at
            FROM daily_digests
            WHERE date = ?
        "#,
        )
        .bind(date.format("%Y-%m-%d").to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(digest)
    }

    /// Date of the most recent stored digest
    pub async fn latest_digest_date(&self) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT date FROM daily_digests ORDER BY date DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(date,)| date))
    }
}
