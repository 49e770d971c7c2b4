//! Test helpers for integration tests.
//!
//! Provides a scripted feed source, a recording notifier and a fixture that
//! wires them to an in-memory database and a refresh engine.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use rssfeed::config::RefreshConfig;
use rssfeed::db::{NewUser, UserRepository};
use rssfeed::feed::{
    Feed, FeedRepository, FeedService, FeedSource, FeedStatus, NewFeed, ParsedEntry, ParsedFeed,
    SubscriptionRepository, Watermark,
};
use rssfeed::{Database, Notifier, RefreshEngine, Result, RssfeedError};

/// Feed source that replays scripted responses, then keeps serving a
/// fallback document (or failing when there is none).
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<Option<ParsedFeed>>>,
    fallback: Mutex<Option<ParsedFeed>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    /// Always serve `feed`.
    pub fn serving(feed: ParsedFeed) -> Arc<Self> {
        let source = Self::default();
        *source.fallback.lock().unwrap() = Some(feed);
        Arc::new(source)
    }

    /// Always fail.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue one failing fetch ahead of the fallback.
    pub fn push_failure(&self) {
        self.script.lock().unwrap().push_back(None);
    }

    /// Replace the fallback document.
    pub fn serve(&self, feed: ParsedFeed) {
        *self.fallback.lock().unwrap() = Some(feed);
    }

    /// Make every later fetch fail.
    pub fn break_source(&self) {
        *self.fallback.lock().unwrap() = None;
    }

    /// Number of fetches so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for ScriptedSource {
    async fn fetch(&self, url: &str) -> Result<ParsedFeed> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().unwrap().pop_front();
        let next = match scripted {
            Some(next) => next,
            None => self.fallback.lock().unwrap().clone(),
        };
        next.ok_or_else(|| RssfeedError::Fetch(format!("{url}: connection refused")))
    }
}

/// Notifier that records every notice.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A notifier whose deliveries all fail after being recorded.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    /// Recorded `(recipient, message)` pairs.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Recorded recipients, sorted.
    pub fn recipients(&self) -> Vec<String> {
        let mut recipients: Vec<String> = self.sent().into_iter().map(|(r, _)| r).collect();
        recipients.sort();
        recipients
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, recipient: &str, message: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), message.to_string()));
        if self.fail {
            return Err(RssfeedError::Validation("mailbox unavailable".to_string()));
        }
        Ok(())
    }
}

/// Refresh settings for tests: two retries, no delay.
pub fn test_config() -> RefreshConfig {
    RefreshConfig {
        maximum_retry: 2,
        retry_delay_secs: 0,
        ..RefreshConfig::default()
    }
}

/// In-memory database, scripted source, recording notifier and engine.
pub struct Fixture {
    pub db: Arc<Database>,
    pub source: Arc<ScriptedSource>,
    pub notifier: Arc<RecordingNotifier>,
    pub engine: Arc<RefreshEngine>,
}

impl Fixture {
    pub async fn new(source: Arc<ScriptedSource>) -> Self {
        Self::build(source, RecordingNotifier::new(), test_config(), None).await
    }

    pub async fn build(
        source: Arc<ScriptedSource>,
        notifier: Arc<RecordingNotifier>,
        config: RefreshConfig,
        admin_email: Option<&str>,
    ) -> Self {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let engine = RefreshEngine::new(db.clone(), source.clone(), notifier.clone(), config)
            .with_admin_email(admin_email.map(str::to_string));
        Self {
            db,
            source,
            notifier,
            engine: Arc::new(engine),
        }
    }

    pub fn service(&self) -> FeedService {
        FeedService::new(self.engine.clone())
    }

    /// Create a user with address `<name>@example.com`.
    pub async fn user(&self, name: &str) -> i64 {
        UserRepository::new(self.db.pool())
            .create(&NewUser::new(name, format!("{name}@example.com")))
            .await
            .unwrap()
            .id
    }

    /// Insert a feed row in the `creating` state.
    pub async fn feed(&self, url: &str) -> Feed {
        FeedRepository::new(self.db.pool())
            .insert_if_absent(&NewFeed::new(url))
            .await
            .unwrap()
            .0
    }

    pub async fn subscribe(&self, user_id: i64, feed_id: i64) {
        SubscriptionRepository::new(self.db.pool())
            .subscribe(user_id, feed_id)
            .await
            .unwrap();
    }

    /// Force a feed into a status and watermark.
    pub async fn set_state(&self, feed_id: i64, status: FeedStatus, watermark: Watermark) {
        FeedRepository::new(self.db.pool())
            .update_status(feed_id, status, watermark)
            .await
            .unwrap();
    }

    pub async fn reload(&self, feed_id: i64) -> Feed {
        FeedRepository::new(self.db.pool())
            .get_by_id(feed_id)
            .await
            .unwrap()
            .unwrap()
    }
}

/// Parsed entry published `age` ago.
pub fn entry(id: &str, age: Duration) -> ParsedEntry {
    ParsedEntry::new(id)
        .with_title(format!("Entry {id}"))
        .with_published(Utc::now() - age)
}

/// Parsed document with the given feed timestamp and entries.
pub fn document(published: Option<DateTime<Utc>>, entries: Vec<ParsedEntry>) -> ParsedFeed {
    ParsedFeed {
        title: Some("Example Feed".to_string()),
        link: Some("https://example.com/".to_string()),
        description: Some("Example description".to_string()),
        language: Some("en".to_string()),
        published,
        entries,
    }
}

/// Document with `count` recent entries named `<prefix>-<n>`.
pub fn fresh_document(published: DateTime<Utc>, prefix: &str, count: usize) -> ParsedFeed {
    let entries = (0..count)
        .map(|i| entry(&format!("{prefix}-{i}"), Duration::minutes(i as i64 + 1)))
        .collect();
    document(Some(published), entries)
}
