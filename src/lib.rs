//! feedwatch - an RSS/Atom feed watcher.
//!
//! Polls feed subscriptions on their own schedules, filters new items
//! against per-feed include/exclude rules, and delivers notifications for
//! previously-unseen items to Telegram chats. A durable seen-item ledger
//! keeps delivery idempotent across restarts.

pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod logging;
pub mod notifier;

pub use config::Config;
pub use db::{Database, DbPool};
pub use error::{FeedwatchError, Result};
pub use feed::Poller;
pub use notifier::{format_notification, Notifier, TelegramNotifier};
