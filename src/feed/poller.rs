//! Timer-driven feed poller.
//!
//! A single worker checks due feeds on a fixed tick, fetches and filters
//! their items, and delivers notifications for unseen items. Feeds within a
//! cycle are processed strictly sequentially, which also throttles total
//! outbound delivery rate.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::fetcher::FeedFetcher;
use super::matcher::filter_items;
use super::repository::{FeedRepository, FilterRepository, SeenItemRepository};
use super::types::Feed;
use crate::db::Database;
use crate::notifier::{format_notification, Notifier};
use crate::Result;

/// Default seconds between due-feed checks.
pub const DEFAULT_TICK_SECS: u64 = 60;

/// Default pause between notification sends. Keeps delivery under roughly
/// 20 messages per second, the downstream sink's rate limit.
pub const DEFAULT_SEND_PACING_MS: u64 = 50;

/// Periodically checks feeds and delivers notifications for new items.
pub struct Poller {
    db: Arc<Database>,
    fetcher: FeedFetcher,
    notifier: Arc<dyn Notifier>,
    tick: Duration,
    pacing: Duration,
}

impl Poller {
    /// Create a poller with the default HTTP fetcher and timing.
    pub fn new(db: Arc<Database>, notifier: Arc<dyn Notifier>) -> Result<Self> {
        Ok(Self::with_fetcher(db, FeedFetcher::new()?, notifier))
    }

    /// Create a poller with a custom fetcher (useful for testing).
    pub fn with_fetcher(db: Arc<Database>, fetcher: FeedFetcher, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db,
            fetcher,
            notifier,
            tick: Duration::from_secs(DEFAULT_TICK_SECS),
            pacing: Duration::from_millis(DEFAULT_SEND_PACING_MS),
        }
    }

    /// Override the tick interval and the pacing delay between sends.
    pub fn with_timing(mut self, tick: Duration, pacing: Duration) -> Self {
        self.tick = tick;
        self.pacing = pacing;
        self
    }

    /// Run the polling loop until shutdown is requested.
    ///
    /// One cycle runs immediately on startup, then on every tick.
    /// Cancellation is observed between ticks and between feeds within a
    /// cycle; a single feed's fetch and delivery are not interrupted.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_secs = self.tick.as_secs(),
            "poller started"
        );

        let mut timer = cycle_timer(self.tick);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if *shutdown.borrow() {
                        return;
                    }
                    self.check_all(&shutdown).await;
                }
                _ = shutdown.changed() => {
                    info!("poller stopping");
                    return;
                }
            }
        }
    }

    /// Run exactly one polling cycle, without cancellation.
    pub async fn run_once(&self) {
        let (_tx, rx) = watch::channel(false);
        self.check_all(&rx).await;
    }

    /// Check and process every feed that is due.
    async fn check_all(&self, shutdown: &watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }

        let feed_repo = FeedRepository::new(self.db.pool());
        let feeds = match feed_repo.list_due().await {
            Ok(feeds) => feeds,
            Err(e) => {
                error!(error = %e, "failed to list due feeds");
                return;
            }
        };

        if feeds.is_empty() {
            debug!("no feeds due");
            return;
        }

        info!(count = feeds.len(), "checking due feeds");

        for feed in feeds {
            if *shutdown.borrow() {
                return;
            }
            self.process_feed(&feed).await;
        }
    }

    /// Fetch, filter, and deliver one feed.
    ///
    /// Failure dispositions:
    /// - fetch failure: last-checked still advances, so a broken feed waits
    ///   out its interval instead of retrying every tick;
    /// - filter load failure: feed is skipped without advancing
    ///   last-checked, so it is retried on the next tick;
    /// - per-item ledger failures: logged, remaining items still processed.
    async fn process_feed(&self, feed: &Feed) {
        debug!(feed_id = feed.id, name = %feed.name, "checking feed");

        let parsed = match self.fetcher.fetch(&feed.url).await {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(feed_id = feed.id, url = %feed.url, error = %e, "failed to fetch feed");
                self.update_last_checked(feed).await;
                return;
            }
        };

        let filters = match FilterRepository::new(self.db.pool()).list(feed.id).await {
            Ok(filters) => filters,
            Err(e) => {
                error!(feed_id = feed.id, error = %e, "failed to list filters");
                return;
            }
        };

        let matched = filter_items(&parsed.items, &filters);

        let seen_repo = SeenItemRepository::new(self.db.pool());
        let mut sent = 0;

        for item in matched {
            let seen = match seen_repo.is_seen(feed.id, &item.guid).await {
                Ok(seen) => seen,
                Err(e) => {
                    error!(feed_id = feed.id, guid = %item.guid, error = %e, "failed to check seen");
                    continue;
                }
            };
            if seen {
                continue;
            }

            let text = format_notification(&feed.name, &item);
            self.notifier.send(feed.chat_id, &text).await;
            sent += 1;

            if let Err(e) = seen_repo.mark_seen(feed.id, &item.guid).await {
                error!(feed_id = feed.id, guid = %item.guid, error = %e, "failed to mark seen");
            }

            if !self.pacing.is_zero() {
                sleep(self.pacing).await;
            }
        }

        if sent > 0 {
            info!(feed_id = feed.id, name = %feed.name, count = sent, "sent notifications");
        }

        self.update_last_checked(feed).await;
    }

    async fn update_last_checked(&self, feed: &Feed) {
        let repo = FeedRepository::new(self.db.pool());
        if let Err(e) = repo.update_last_checked(feed.id, Utc::now()).await {
            error!(feed_id = feed.id, error = %e, "failed to update last checked");
        }
    }
}

/// Cycle timer for the polling loop.
///
/// A cycle that overruns the tick must not be followed by a burst of
/// catch-up cycles; the missed tick fires once and the schedule resumes a
/// full period later.
fn cycle_timer(tick: Duration) -> Interval {
    let mut timer = interval(tick);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::fetcher::{FeedTransport, FetchResponse};
    use crate::feed::types::{FilterKind, FilterScope, NewFeed, NewFilter};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeTransport {
        status: u16,
        body: String,
    }

    #[async_trait]
    impl FeedTransport for FakeTransport {
        async fn get(&self, _url: &str) -> crate::Result<FetchResponse> {
            Ok(FetchResponse {
                status: self.status,
                body: self.body.as_bytes().to_vec(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, chat_id: i64, text: &str) {
            self.messages
                .lock()
                .unwrap()
                .push((chat_id, text.to_string()));
        }
    }

    const FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>DevOps Weekly</title>
    <item>
      <title>Kubernetes 1.31 released</title>
      <link>https://devops.example.com/1</link>
      <guid>item-1</guid>
      <description>What is new in the latest Kubernetes release</description>
    </item>
    <item>
      <title>Terraform state deep dive</title>
      <link>https://devops.example.com/2</link>
      <guid>item-2</guid>
      <description>Managing infrastructure state at scale</description>
    </item>
    <item>
      <title>Kubernetes course and certified training</title>
      <link>https://devops.example.com/3</link>
      <guid>item-3</guid>
      <description>Sign up for our kubernetes course with hands-on training</description>
    </item>
    <item>
      <title>Site reliability vacancy</title>
      <link>https://devops.example.com/4</link>
      <guid>item-4</guid>
      <description>We are hiring SREs</description>
    </item>
    <item>
      <title>Securing kubernetes clusters</title>
      <link>https://devops.example.com/5</link>
      <guid>item-5</guid>
      <description>Hardening guide for production clusters</description>
    </item>
  </channel>
</rss>"#;

    fn poller_with(
        db: Arc<Database>,
        notifier: Arc<RecordingNotifier>,
        status: u16,
        body: &str,
    ) -> Poller {
        let fetcher = FeedFetcher::with_transport(Box::new(FakeTransport {
            status,
            body: body.to_string(),
        }));
        Poller::with_fetcher(db, fetcher, notifier)
            .with_timing(Duration::from_secs(60), Duration::ZERO)
    }

    async fn create_feed(db: &Database) -> Feed {
        FeedRepository::new(db.pool())
            .create(&NewFeed::new(100, "DevOps Weekly", "https://devops.example.com/rss").with_interval(15))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_cycle_delivers_all_unseen_items() {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let feed = create_feed(&db).await;
        let notifier = Arc::new(RecordingNotifier::default());

        let poller = poller_with(db.clone(), notifier.clone(), 200, FIXTURE);
        poller.run_once().await;

        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages.len(), 5);
        assert!(messages.iter().all(|(chat_id, _)| *chat_id == 100));
        assert!(messages[0].1.starts_with("[DevOps Weekly]\n\nKubernetes 1.31 released"));

        drop(messages);
        assert_eq!(
            SeenItemRepository::new(db.pool()).count(feed.id).await.unwrap(),
            5
        );
        let updated = FeedRepository::new(db.pool()).get(feed.id).await.unwrap().unwrap();
        assert!(updated.last_checked_at.is_some());
    }

    #[tokio::test]
    async fn test_cycle_skips_seen_items_but_advances_last_checked() {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let feed = create_feed(&db).await;

        let seen = SeenItemRepository::new(db.pool());
        for guid in ["item-1", "item-2", "item-3", "item-4", "item-5"] {
            seen.mark_seen(feed.id, guid).await.unwrap();
        }

        let notifier = Arc::new(RecordingNotifier::default());
        let poller = poller_with(db.clone(), notifier.clone(), 200, FIXTURE);
        poller.run_once().await;

        assert!(notifier.messages.lock().unwrap().is_empty());
        let updated = FeedRepository::new(db.pool()).get(feed.id).await.unwrap().unwrap();
        assert!(updated.last_checked_at.is_some());
    }

    #[tokio::test]
    async fn test_second_cycle_sends_nothing_new() {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let feed = create_feed(&db).await;
        let notifier = Arc::new(RecordingNotifier::default());

        let poller = poller_with(db.clone(), notifier.clone(), 200, FIXTURE);
        poller.run_once().await;
        assert_eq!(notifier.messages.lock().unwrap().len(), 5);

        // Make the feed due again and rerun: everything is already seen.
        FeedRepository::new(db.pool())
            .update_last_checked(feed.id, Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        poller.run_once().await;
        assert_eq!(notifier.messages.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_cycle_applies_filters() {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let feed = create_feed(&db).await;

        let filters = FilterRepository::new(db.pool());
        filters
            .create(&NewFilter::new(
                feed.id,
                FilterKind::Include,
                FilterScope::All,
                "kubernetes",
            ))
            .await
            .unwrap();
        filters
            .create(&NewFilter::new(
                feed.id,
                FilterKind::ExcludeRegex,
                FilterScope::All,
                "course.*training",
            ))
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let poller = poller_with(db.clone(), notifier.clone(), 200, FIXTURE);
        poller.run_once().await;

        // Three items mention kubernetes; one of those also matches the
        // exclude regex, leaving two deliveries.
        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].1.contains("Kubernetes 1.31 released"));
        assert!(messages[1].1.contains("Securing kubernetes clusters"));
    }

    #[tokio::test]
    async fn test_fetch_failure_advances_last_checked_without_deliveries() {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let feed = create_feed(&db).await;
        let notifier = Arc::new(RecordingNotifier::default());

        let poller = poller_with(db.clone(), notifier.clone(), 503, "unavailable");
        poller.run_once().await;

        assert!(notifier.messages.lock().unwrap().is_empty());
        assert_eq!(SeenItemRepository::new(db.pool()).count(feed.id).await.unwrap(), 0);
        let updated = FeedRepository::new(db.pool()).get(feed.id).await.unwrap().unwrap();
        assert!(updated.last_checked_at.is_some());
    }

    #[tokio::test]
    async fn test_unparsable_body_advances_last_checked_without_deliveries() {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let feed = create_feed(&db).await;
        let notifier = Arc::new(RecordingNotifier::default());

        let poller = poller_with(db.clone(), notifier.clone(), 200, "definitely not xml");
        poller.run_once().await;

        assert!(notifier.messages.lock().unwrap().is_empty());
        assert_eq!(SeenItemRepository::new(db.pool()).count(feed.id).await.unwrap(), 0);
        let updated = FeedRepository::new(db.pool()).get(feed.id).await.unwrap().unwrap();
        assert!(updated.last_checked_at.is_some());
    }

    #[tokio::test]
    async fn test_cancellation_before_cycle_processes_nothing() {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let feed = create_feed(&db).await;
        let notifier = Arc::new(RecordingNotifier::default());

        let poller = poller_with(db.clone(), notifier.clone(), 200, FIXTURE);

        let (tx, rx) = watch::channel(true);
        poller.check_all(&rx).await;
        drop(tx);

        assert!(notifier.messages.lock().unwrap().is_empty());
        assert_eq!(SeenItemRepository::new(db.pool()).count(feed.id).await.unwrap(), 0);
        let unchanged = FeedRepository::new(db.pool()).get(feed.id).await.unwrap().unwrap();
        assert!(unchanged.last_checked_at.is_none());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_signal() {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let poller = poller_with(db, notifier, 200, FIXTURE);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { poller.run(rx).await });

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("poller did not stop after shutdown")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrun_cycle_does_not_burst_catch_up_ticks() {
        let mut timer = cycle_timer(Duration::from_millis(100));
        timer.tick().await; // first tick is immediate

        // Simulate a cycle that overruns three ticks.
        tokio::time::sleep(Duration::from_millis(350)).await;

        // The missed tick fires once, immediately.
        timer.tick().await;

        // The next tick waits a full period instead of draining the backlog.
        let before = tokio::time::Instant::now();
        timer.tick().await;
        assert!(tokio::time::Instant::now() - before >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_inactive_feed_is_not_processed() {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        FeedRepository::new(db.pool())
            .create(&NewFeed::new(100, "Paused", "https://devops.example.com/rss").paused())
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let poller = poller_with(db.clone(), notifier.clone(), 200, FIXTURE);
        poller.run_once().await;

        assert!(notifier.messages.lock().unwrap().is_empty());
    }
}
