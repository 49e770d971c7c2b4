//! Feed service for rssfeed.
//!
//! High-level operations for readers: subscriptions, manual refreshes,
//! entry listing and read tracking. Reads only return entries published
//! within the retention window of subscribed feeds.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::refresh::RefreshEngine;
use super::repository::{
    EntryRepository, FeedRepository, ReadMarkRepository, SubscriptionRepository,
};
use super::scheduler::{spawn_refresh, DispatchedRefresh};
use super::types::{Entry, EntryFilter, Feed, FeedTarget, NewFeed, Subscription};
use crate::db::{DbPool, UserRepository};
use crate::{Result, RssfeedError};

/// Result of a subscribe call.
#[derive(Debug)]
pub struct SubscribeOutcome {
    pub feed: Feed,
    pub subscription: Subscription,
    /// False when the user was already subscribed.
    pub newly_subscribed: bool,
    /// Initial refresh, started only when the feed row was created.
    pub initial_refresh: Option<DispatchedRefresh>,
}

/// Service for reader operations.
pub struct FeedService {
    engine: Arc<RefreshEngine>,
}

impl FeedService {
    /// Create a service sharing the engine used by the scheduler.
    pub fn new(engine: Arc<RefreshEngine>) -> Self {
        Self { engine }
    }

    fn pool(&self) -> &DbPool {
        self.engine.database().pool()
    }

    fn retention_start(&self) -> DateTime<Utc> {
        Utc::now() - self.engine.config().retention()
    }

    /// Get the feed stored for `feed_url`, creating it from the feed's
    /// metadata if it is new.
    ///
    /// A new feed starts in the `creating` state without entries; callers
    /// start the initial refresh when `created` is true.
    ///
    /// # Errors
    ///
    /// Returns [`RssfeedError::Validation`] if the URL is empty or the
    /// document cannot be fetched.
    pub async fn get_or_create_feed(&self, feed_url: &str) -> Result<(Feed, bool)> {
        let feed_url = feed_url.trim();
        if feed_url.is_empty() {
            return Err(RssfeedError::Validation("feed URL is empty".to_string()));
        }

        let feeds = FeedRepository::new(self.pool());
        if let Some(feed) = feeds.get_by_url(feed_url).await? {
            return Ok((feed, false));
        }

        let parsed = self
            .engine
            .source()
            .fetch(feed_url)
            .await
            .map_err(|e| RssfeedError::Validation(format!("cannot read feed {}: {}", feed_url, e)))?;

        let (feed, created) = feeds
            .insert_if_absent(&NewFeed::from_parsed(feed_url, &parsed))
            .await?;
        if created {
            info!("Created feed {}: {}", feed.id, feed.feed_url);
        }
        Ok((feed, created))
    }

    /// Subscribe a user to a feed URL.
    pub async fn subscribe(&self, user_id: i64, feed_url: &str) -> Result<SubscribeOutcome> {
        if UserRepository::new(self.pool())
            .get_by_id(user_id)
            .await?
            .is_none()
        {
            return Err(RssfeedError::NotFound("user".to_string()));
        }

        let (feed, created) = self.get_or_create_feed(feed_url).await?;
        let (subscription, newly_subscribed) = SubscriptionRepository::new(self.pool())
            .subscribe(user_id, feed.id)
            .await?;

        let initial_refresh = created.then(|| spawn_refresh(&self.engine, feed.id));

        Ok(SubscribeOutcome {
            feed,
            subscription,
            newly_subscribed,
            initial_refresh,
        })
    }

    /// Unsubscribe a user from a feed, dropping their read marks on it.
    pub async fn unsubscribe(&self, user_id: i64, feed_id: i64) -> Result<()> {
        if !SubscriptionRepository::new(self.pool())
            .unsubscribe(user_id, feed_id)
            .await?
        {
            return Err(RssfeedError::NotFound("subscription".to_string()));
        }
        info!("User {} unsubscribed from feed {}", user_id, feed_id);
        Ok(())
    }

    /// List the feeds a user subscribes to.
    pub async fn list_subscriptions(&self, user_id: i64) -> Result<Vec<Feed>> {
        SubscriptionRepository::new(self.pool())
            .list_feeds(user_id)
            .await
    }

    /// Start a refresh of one feed regardless of its status.
    pub async fn trigger_refresh(&self, target: impl Into<FeedTarget>) -> Result<DispatchedRefresh> {
        let target = target.into();
        let feeds = FeedRepository::new(self.pool());
        let feed = match &target {
            FeedTarget::Id(id) => feeds.get_by_id(*id).await?,
            FeedTarget::Url(url) => feeds.get_by_url(url).await?,
        }
        .ok_or_else(|| RssfeedError::NotFound(target.to_string()))?;

        info!("Manual refresh of feed {}", feed.id);
        Ok(spawn_refresh(&self.engine, feed.id))
    }

    /// Start a refresh of every feed the user subscribes to.
    pub async fn trigger_refresh_all(&self, user_id: i64) -> Result<Vec<DispatchedRefresh>> {
        let feeds = self.list_subscriptions(user_id).await?;
        Ok(feeds
            .iter()
            .map(|feed| spawn_refresh(&self.engine, feed.id))
            .collect())
    }

    /// List visible entries, newest first.
    pub async fn list_entries(&self, user_id: i64, filter: &EntryFilter) -> Result<Vec<Entry>> {
        EntryRepository::new(self.pool())
            .list_for_user(user_id, filter, self.retention_start())
            .await
    }

    /// Get a visible entry and whether the user has read it.
    pub async fn get_entry(&self, user_id: i64, entry_id: i64) -> Result<(Entry, bool)> {
        let entry = self.visible_entry(user_id, entry_id).await?;
        let read = ReadMarkRepository::new(self.pool())
            .is_read(user_id, entry.id)
            .await?;
        Ok((entry, read))
    }

    /// Mark a visible entry read. Returns false if it already was.
    pub async fn mark_read(&self, user_id: i64, entry_id: i64) -> Result<bool> {
        let entry = self.visible_entry(user_id, entry_id).await?;
        ReadMarkRepository::new(self.pool())
            .mark_read(user_id, entry.id)
            .await
    }

    async fn visible_entry(&self, user_id: i64, entry_id: i64) -> Result<Entry> {
        EntryRepository::new(self.pool())
            .get_visible(user_id, entry_id, self.retention_start())
            .await?
            .ok_or_else(|| RssfeedError::NotFound("entry".to_string()))
    }
}
