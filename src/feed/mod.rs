//! Feed polling pipeline for feedwatch.
//!
//! Covers feed subscriptions, filter rules, retrieval and normalization,
//! filter matching, the seen-item ledger, and the polling loop itself.

pub mod fetcher;
pub mod matcher;
pub mod poller;
pub mod repository;
pub mod types;

pub use fetcher::{item_guid, validate_url, FeedFetcher, FeedTransport, FetchResponse, HttpTransport};
pub use matcher::{filter_items, matches, validate_pattern};
pub use poller::{Poller, DEFAULT_SEND_PACING_MS, DEFAULT_TICK_SECS};
pub use repository::{FeedRepository, FilterRepository, SeenItemRepository};
pub use types::{
    Feed, FeedFilter, FilterKind, FilterScope, MatchedItem, NewFeed, NewFilter, ParsedFeed,
    ParsedItem, FETCH_TIMEOUT_SECS, MAX_DESCRIPTION_LENGTH, MAX_FEED_SIZE, MAX_INTERVAL_MINUTES,
    MIN_INTERVAL_MINUTES,
};
