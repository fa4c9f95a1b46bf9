use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another instance of the application has locked the database
    #[error("Another instance of newsbrief appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Feed data from database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Feed {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub html_url: Option<String>,
    /// Normalized category id the feed was imported under.
    pub category: String,
    pub last_fetched: Option<i64>,
    pub error: Option<String>,
    /// Number of consecutive fetch failures (circuit breaker)
    pub consecutive_failures: i64,
}

/// Article data from database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Article {
    pub id: i64,
    pub feed_id: i64,
    pub guid: String,
    pub title: String,
    pub url: Option<String>,
    pub published: Option<i64>,
    /// Feed-provided summary or excerpt.
    pub summary: Option<String>,
    /// Full extracted article text, when extraction succeeded.
    pub content: Option<String>,
    /// Generated summary; NULL until the summarization pass runs.
    pub ai_summary: Option<String>,
    /// "hosted", "extractive", or "verbatim"; NULL until summarized.
    pub summary_method: Option<String>,
    pub fetched_at: i64,
}

/// A new article row from a feed refresh. Insert-only: rows that
/// already exist keep their stored content and summaries.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub guid: String,
    pub title: String,
    pub url: Option<String>,
    pub published: Option<i64>,
    pub summary: Option<String>,
}

/// Article joined with its feed's metadata, for digest rendering.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ArticleWithFeed {
    pub id: i64,
    pub title: String,
    pub url: Option<String>,
    pub published: Option<i64>,
    pub summary: Option<String>,
    pub ai_summary: Option<String>,
    pub feed_title: String,
    pub category: String,
}

/// A stored daily digest.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Digest {
    pub id: i64,
    /// ISO date (`YYYY-MM-DD`), unique.
    pub date: String,
    pub content: String,
    pub article_count: i64,
    pub created_at: i64,
}
