//! Feed, filter, and seen-item repositories for feedwatch.

use chrono::{DateTime, NaiveDateTime, Utc};

use super::matcher::validate_pattern;
use super::types::{validate_interval, Feed, FeedFilter, FilterKind, FilterScope, NewFeed, NewFilter};
use crate::db::DbPool;
use crate::{FeedwatchError, Result};

/// Storage layout for timestamps: ISO-8601 UTC with second precision.
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, DATETIME_FORMAT) {
        return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
    }
    // Fall back to RFC3339 for values written by other tools.
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    None
}

/// Row type for a feed from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FeedRow {
    id: i64,
    chat_id: i64,
    name: String,
    url: String,
    interval_minutes: i64,
    is_active: bool,
    last_checked_at: Option<String>,
    created_at: String,
}

impl From<FeedRow> for Feed {
    fn from(row: FeedRow) -> Self {
        Feed {
            id: row.id,
            chat_id: row.chat_id,
            name: row.name,
            url: row.url,
            interval_minutes: row.interval_minutes,
            is_active: row.is_active,
            last_checked_at: row.last_checked_at.and_then(|s| parse_datetime(&s)),
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Row type for a filter from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FilterRow {
    id: i64,
    feed_id: i64,
    kind: String,
    scope: String,
    value: String,
    created_at: String,
}

impl TryFrom<FilterRow> for FeedFilter {
    type Error = FeedwatchError;

    fn try_from(row: FilterRow) -> Result<Self> {
        Ok(FeedFilter {
            id: row.id,
            feed_id: row.feed_id,
            kind: FilterKind::parse(&row.kind)?,
            scope: FilterScope::parse(&row.scope)?,
            value: row.value,
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
        })
    }
}

const FEED_COLUMNS: &str =
    "id, chat_id, name, url, interval_minutes, is_active, last_checked_at, created_at";

/// Repository for feed subscriptions.
pub struct FeedRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FeedRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new feed.
    pub async fn create(&self, feed: &NewFeed) -> Result<Feed> {
        validate_interval(feed.interval_minutes)?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO feeds (chat_id, name, url, interval_minutes, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(feed.chat_id)
        .bind(&feed.name)
        .bind(&feed.url)
        .bind(feed.interval_minutes)
        .bind(feed.is_active)
        .bind(format_datetime(Utc::now()))
        .fetch_one(self.pool)
        .await
        .map_err(|e| FeedwatchError::Database(e.to_string()))?;

        self.get(id)
            .await?
            .ok_or_else(|| FeedwatchError::NotFound("feed".into()))
    }

    /// Get a feed by ID.
    pub async fn get(&self, id: i64) -> Result<Option<Feed>> {
        let row = sqlx::query_as::<_, FeedRow>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| FeedwatchError::Database(e.to_string()))?;

        Ok(row.map(Feed::from))
    }

    /// List all feeds belonging to a chat, ordered by registration order.
    pub async fn list_by_chat(&self, chat_id: i64) -> Result<Vec<Feed>> {
        let rows = sqlx::query_as::<_, FeedRow>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE chat_id = $1 ORDER BY id ASC"
        ))
        .bind(chat_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| FeedwatchError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    /// List active feeds that are due for checking.
    ///
    /// A feed is due when it has never been checked, or when its own
    /// interval has elapsed since the last check. Ordered by ID so cycles
    /// are deterministic.
    pub async fn list_due(&self) -> Result<Vec<Feed>> {
        let rows = sqlx::query_as::<_, FeedRow>(&format!(
            r#"
            SELECT {FEED_COLUMNS}
            FROM feeds
            WHERE is_active = 1
              AND (last_checked_at IS NULL
                   OR datetime(last_checked_at, '+' || interval_minutes || ' minutes') <= datetime($1))
            ORDER BY id ASC
            "#
        ))
        .bind(format_datetime(Utc::now()))
        .fetch_all(self.pool)
        .await
        .map_err(|e| FeedwatchError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    /// Persist changes to an existing feed.
    pub async fn update(&self, feed: &Feed) -> Result<()> {
        validate_interval(feed.interval_minutes)?;

        sqlx::query(
            r#"
            UPDATE feeds
            SET name = $1, url = $2, interval_minutes = $3, is_active = $4, last_checked_at = $5
            WHERE id = $6
            "#,
        )
        .bind(&feed.name)
        .bind(&feed.url)
        .bind(feed.interval_minutes)
        .bind(feed.is_active)
        .bind(feed.last_checked_at.map(format_datetime))
        .bind(feed.id)
        .execute(self.pool)
        .await
        .map_err(|e| FeedwatchError::Database(e.to_string()))?;

        Ok(())
    }

    /// Persist a new last-checked timestamp, leaving other fields untouched.
    pub async fn update_last_checked(&self, id: i64, checked_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE feeds SET last_checked_at = $1 WHERE id = $2")
            .bind(format_datetime(checked_at))
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| FeedwatchError::Database(e.to_string()))?;

        Ok(())
    }

    /// Delete a feed together with its filters and seen items.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| FeedwatchError::Database(e.to_string()))?;

        sqlx::query("DELETE FROM seen_items WHERE feed_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| FeedwatchError::Database(e.to_string()))?;

        sqlx::query("DELETE FROM filters WHERE feed_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| FeedwatchError::Database(e.to_string()))?;

        sqlx::query("DELETE FROM feeds WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| FeedwatchError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| FeedwatchError::Database(e.to_string()))?;

        Ok(())
    }
}

/// Repository for filter rules.
pub struct FilterRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FilterRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new filter.
    ///
    /// Regex kinds are validated before insertion so a broken pattern is
    /// rejected up front rather than silently never matching.
    pub async fn create(&self, filter: &NewFilter) -> Result<FeedFilter> {
        if filter.kind.is_regex() {
            validate_pattern(&filter.value)?;
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO filters (feed_id, kind, scope, value, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(filter.feed_id)
        .bind(filter.kind.as_str())
        .bind(filter.scope.as_str())
        .bind(&filter.value)
        .bind(format_datetime(Utc::now()))
        .fetch_one(self.pool)
        .await
        .map_err(|e| FeedwatchError::Database(e.to_string()))?;

        self.get(id)
            .await?
            .ok_or_else(|| FeedwatchError::NotFound("filter".into()))
    }

    /// Get a filter by ID.
    pub async fn get(&self, id: i64) -> Result<Option<FeedFilter>> {
        let row = sqlx::query_as::<_, FilterRow>(
            "SELECT id, feed_id, kind, scope, value, created_at FROM filters WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| FeedwatchError::Database(e.to_string()))?;

        row.map(FeedFilter::try_from).transpose()
    }

    /// List all filters for a feed, ordered by creation order.
    pub async fn list(&self, feed_id: i64) -> Result<Vec<FeedFilter>> {
        let rows = sqlx::query_as::<_, FilterRow>(
            "SELECT id, feed_id, kind, scope, value, created_at FROM filters WHERE feed_id = $1 ORDER BY id ASC",
        )
        .bind(feed_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| FeedwatchError::Database(e.to_string()))?;

        rows.into_iter().map(FeedFilter::try_from).collect()
    }

    /// Delete a filter by ID.
    pub async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM filters WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| FeedwatchError::Database(e.to_string()))?;

        Ok(())
    }
}

/// Repository for the seen-item ledger.
pub struct SeenItemRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> SeenItemRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Check whether an item has already been delivered for a feed.
    pub async fn is_seen(&self, feed_id: i64, guid: &str) -> Result<bool> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM seen_items WHERE feed_id = $1 AND guid = $2")
                .bind(feed_id)
                .bind(guid)
                .fetch_one(self.pool)
                .await
                .map_err(|e| FeedwatchError::Database(e.to_string()))?;

        Ok(count.0 > 0)
    }

    /// Record that an item has been delivered. Idempotent: re-inserting an
    /// existing pair is a no-op.
    pub async fn mark_seen(&self, feed_id: i64, guid: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO seen_items (feed_id, guid, seen_at) VALUES ($1, $2, $3)",
        )
        .bind(feed_id)
        .bind(guid)
        .bind(format_datetime(Utc::now()))
        .execute(self.pool)
        .await
        .map_err(|e| FeedwatchError::Database(e.to_string()))?;

        Ok(())
    }

    /// Count seen items for a feed.
    pub async fn count(&self, feed_id: i64) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM seen_items WHERE feed_id = $1")
                .bind(feed_id)
                .fetch_one(self.pool)
                .await
                .map_err(|e| FeedwatchError::Database(e.to_string()))?;

        Ok(count.0)
    }
}
