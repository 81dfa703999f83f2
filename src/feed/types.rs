//! Feed domain types for feedwatch.

use chrono::{DateTime, Duration, Utc};

use crate::{FeedwatchError, Result};

/// Minimum polling interval in minutes.
pub const MIN_INTERVAL_MINUTES: i64 = 1;

/// Maximum polling interval in minutes (24 hours).
pub const MAX_INTERVAL_MINUTES: i64 = 1440;

/// Maximum length for a delivered item description, before the ellipsis.
pub const MAX_DESCRIPTION_LENGTH: usize = 300;

/// Maximum feed response size in bytes (5 MiB).
pub const MAX_FEED_SIZE: u64 = 5 * 1024 * 1024;

/// Total fetch timeout in seconds.
pub const FETCH_TIMEOUT_SECS: u64 = 30;

/// User agent string for feed fetching.
pub const USER_AGENT: &str = "FeedwatchBot/1.0";

/// A feed subscription.
#[derive(Debug, Clone)]
pub struct Feed {
    /// Feed ID.
    pub id: i64,
    /// Chat the feed delivers notifications to.
    pub chat_id: i64,
    /// Display name.
    pub name: String,
    /// Feed URL.
    pub url: String,
    /// Polling interval in minutes (1..=1440).
    pub interval_minutes: i64,
    /// Whether the feed is polled.
    pub is_active: bool,
    /// Last time a check was attempted, successful or not.
    pub last_checked_at: Option<DateTime<Utc>>,
    /// When the feed was created.
    pub created_at: DateTime<Utc>,
}

impl Feed {
    /// Check whether the feed is due for polling at the given instant.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        match self.last_checked_at {
            None => true,
            Some(last) => last + Duration::minutes(self.interval_minutes) <= now,
        }
    }
}

/// Validate a polling interval against the allowed bounds.
pub fn validate_interval(minutes: i64) -> Result<()> {
    if !(MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(&minutes) {
        return Err(FeedwatchError::Validation(format!(
            "interval must be between {MIN_INTERVAL_MINUTES} and {MAX_INTERVAL_MINUTES} minutes"
        )));
    }
    Ok(())
}

/// New feed for creation.
#[derive(Debug, Clone)]
pub struct NewFeed {
    /// Chat the feed delivers notifications to.
    pub chat_id: i64,
    /// Display name.
    pub name: String,
    /// Feed URL.
    pub url: String,
    /// Polling interval in minutes.
    pub interval_minutes: i64,
    /// Whether the feed starts active.
    pub is_active: bool,
}

impl NewFeed {
    /// Create a new feed with the default 60 minute interval, active.
    pub fn new(chat_id: i64, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            chat_id,
            name: name.into(),
            url: url.into(),
            interval_minutes: 60,
            is_active: true,
        }
    }

    /// Set the polling interval in minutes.
    pub fn with_interval(mut self, minutes: i64) -> Self {
        self.interval_minutes = minutes;
        self
    }

    /// Mark the feed inactive on creation.
    pub fn paused(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// The type of a filter rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Item must contain the literal value (OR across includes).
    Include,
    /// Item containing the literal value is rejected.
    Exclude,
    /// Item must match the regex (OR across includes).
    IncludeRegex,
    /// Item matching the regex is rejected.
    ExcludeRegex,
}

impl FilterKind {
    /// Database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::Include => "include",
            FilterKind::Exclude => "exclude",
            FilterKind::IncludeRegex => "include_re",
            FilterKind::ExcludeRegex => "exclude_re",
        }
    }

    /// Parse from the database string representation.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "include" => Ok(FilterKind::Include),
            "exclude" => Ok(FilterKind::Exclude),
            "include_re" => Ok(FilterKind::IncludeRegex),
            "exclude_re" => Ok(FilterKind::ExcludeRegex),
            other => Err(FeedwatchError::Validation(format!(
                "unknown filter kind: {other}"
            ))),
        }
    }

    /// Whether this kind contributes to include (OR) semantics.
    pub fn is_include(&self) -> bool {
        matches!(self, FilterKind::Include | FilterKind::IncludeRegex)
    }

    /// Whether the filter value is a regular expression.
    pub fn is_regex(&self) -> bool {
        matches!(self, FilterKind::IncludeRegex | FilterKind::ExcludeRegex)
    }
}

/// Which part of an item's text a filter is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterScope {
    /// Title only.
    Title,
    /// Description only.
    Content,
    /// Title and description.
    All,
}

impl FilterScope {
    /// Database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterScope::Title => "title",
            FilterScope::Content => "content",
            FilterScope::All => "all",
        }
    }

    /// Parse from the database string representation.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "title" => Ok(FilterScope::Title),
            "content" => Ok(FilterScope::Content),
            "all" => Ok(FilterScope::All),
            other => Err(FeedwatchError::Validation(format!(
                "unknown filter scope: {other}"
            ))),
        }
    }
}

/// A filter rule attached to a feed.
#[derive(Debug, Clone)]
pub struct FeedFilter {
    /// Filter ID.
    pub id: i64,
    /// Owning feed.
    pub feed_id: i64,
    /// Rule kind.
    pub kind: FilterKind,
    /// Text scope the rule applies to.
    pub scope: FilterScope,
    /// Literal value or regex pattern.
    pub value: String,
    /// When the filter was created.
    pub created_at: DateTime<Utc>,
}

/// New filter for creation.
#[derive(Debug, Clone)]
pub struct NewFilter {
    /// Owning feed.
    pub feed_id: i64,
    /// Rule kind.
    pub kind: FilterKind,
    /// Text scope the rule applies to.
    pub scope: FilterScope,
    /// Literal value or regex pattern.
    pub value: String,
}

impl NewFilter {
    /// Create a new filter.
    pub fn new(
        feed_id: i64,
        kind: FilterKind,
        scope: FilterScope,
        value: impl Into<String>,
    ) -> Self {
        Self {
            feed_id,
            kind,
            scope,
            value: value.into(),
        }
    }
}

/// A normalized feed fetched from an external source.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    /// Feed title.
    pub title: String,
    /// Normalized items, in source order.
    pub items: Vec<ParsedItem>,
}

/// A normalized item from a fetched feed.
#[derive(Debug, Clone, Default)]
pub struct ParsedItem {
    /// Item title.
    pub title: String,
    /// Item description/summary.
    pub description: String,
    /// Link to the original article.
    pub link: String,
    /// Raw identifier from the source; empty when absent.
    pub raw_guid: String,
}

/// An item that passed filtering, ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedItem {
    /// Item title.
    pub title: String,
    /// Description, truncated for delivery.
    pub description: String,
    /// Link to the original article.
    pub link: String,
    /// Derived identity (raw GUID or content hash).
    pub guid: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_feed(last_checked_at: Option<DateTime<Utc>>) -> Feed {
        Feed {
            id: 1,
            chat_id: 100,
            name: "Test".to_string(),
            url: "https://example.com/rss".to_string(),
            interval_minutes: 15,
            is_active: true,
            last_checked_at,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_feed_never_checked_is_due() {
        let feed = sample_feed(None);
        assert!(feed.is_due(Utc::now()));
    }

    #[test]
    fn test_feed_due_boundary() {
        let now = Utc::now();

        // One second past the interval: due.
        let overdue = sample_feed(Some(now - Duration::minutes(15) - Duration::seconds(1)));
        assert!(overdue.is_due(now));

        // One second short of the interval: not due.
        let recent = sample_feed(Some(now - Duration::minutes(15) + Duration::seconds(1)));
        assert!(!recent.is_due(now));
    }

    #[test]
    fn test_inactive_feed_never_due() {
        let mut feed = sample_feed(None);
        feed.is_active = false;
        assert!(!feed.is_due(Utc::now()));
    }

    #[test]
    fn test_validate_interval_bounds() {
        assert!(validate_interval(1).is_ok());
        assert!(validate_interval(60).is_ok());
        assert!(validate_interval(1440).is_ok());
        assert!(validate_interval(0).is_err());
        assert!(validate_interval(1441).is_err());
        assert!(validate_interval(-5).is_err());
    }

    #[test]
    fn test_filter_kind_round_trip() {
        for kind in [
            FilterKind::Include,
            FilterKind::Exclude,
            FilterKind::IncludeRegex,
            FilterKind::ExcludeRegex,
        ] {
            assert_eq!(FilterKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(FilterKind::parse("bogus").is_err());
    }

    #[test]
    fn test_filter_kind_classification() {
        assert!(FilterKind::Include.is_include());
        assert!(FilterKind::IncludeRegex.is_include());
        assert!(!FilterKind::Exclude.is_include());
        assert!(!FilterKind::ExcludeRegex.is_include());

        assert!(FilterKind::IncludeRegex.is_regex());
        assert!(FilterKind::ExcludeRegex.is_regex());
        assert!(!FilterKind::Include.is_regex());
    }

    #[test]
    fn test_filter_scope_round_trip() {
        for scope in [FilterScope::Title, FilterScope::Content, FilterScope::All] {
            assert_eq!(FilterScope::parse(scope.as_str()).unwrap(), scope);
        }
        assert!(FilterScope::parse("body").is_err());
    }

    #[test]
    fn test_new_feed_builder() {
        let feed = NewFeed::new(100, "DevOps Weekly", "https://example.com/rss")
            .with_interval(30)
            .paused();
        assert_eq!(feed.chat_id, 100);
        assert_eq!(feed.interval_minutes, 30);
        assert!(!feed.is_active);
    }
}
