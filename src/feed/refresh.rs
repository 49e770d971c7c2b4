//! Feed refresh engine.
//!
//! One refresh runs fetch, change detection, entry merge and settlement for a
//! single feed:
//!
//! 1. Fetch the document, retrying up to `maximum_retry` more times.
//! 2. If the feed timestamp is unchanged and the feed is already `updated`,
//!    record the attempt and stop.
//! 3. Upsert every entry in its own transaction, then retry only the failed
//!    ones, up to `maximum_retry` more passes.
//! 4. Settle to `updated` with the new watermark, or escalate to `error`
//!    keeping the old watermark and notify subscribers on the transition.
//!
//! The engine never fails. Every problem ends as a status change or a logged
//! [`RefreshOutcome::Skipped`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::fetcher::FeedSource;
use super::lock::FeedLocks;
use super::repository::{EntryRepository, FeedRepository};
use super::types::{
    Feed, FeedMetadata, FeedStatus, FeedTarget, NewEntry, ParsedEntry, ParsedFeed, Watermark,
};
use crate::config::RefreshConfig;
use crate::db::Database;
use crate::notify::{failure_message, Notifier};
use crate::{Result, RssfeedError};

/// Result of one refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Feed timestamp unchanged, only `last_updated` advanced.
    Unchanged,
    /// Every entry merged and the feed is `updated`.
    Updated { new_entries: usize },
    /// The feed moved to `error`.
    Escalated {
        reason: EscalationReason,
        /// Whether subscribers were notified (false if it already was `error`).
        notified: bool,
    },
    /// The feed could not be loaded or settled.
    Skipped { reason: String },
}

/// Why a refresh escalated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationReason {
    /// Every fetch attempt failed.
    FetchFailed { attempts: u32, error: String },
    /// Some entries could not be stored after all retry passes.
    EntriesFailed { failed: usize },
}

struct FetchFailure {
    attempts: u32,
    error: RssfeedError,
}

/// Runs refreshes against a feed source, a database and a notifier.
pub struct RefreshEngine {
    db: Arc<Database>,
    source: Arc<dyn FeedSource>,
    notifier: Arc<dyn Notifier>,
    config: RefreshConfig,
    admin_email: Option<String>,
    locks: FeedLocks,
}

impl RefreshEngine {
    /// Create an engine without an admin recipient.
    pub fn new(
        db: Arc<Database>,
        source: Arc<dyn FeedSource>,
        notifier: Arc<dyn Notifier>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            db,
            source,
            notifier,
            config,
            admin_email: None,
            locks: FeedLocks::new(),
        }
    }

    /// Also notify this address whenever a feed escalates.
    pub fn with_admin_email(mut self, admin_email: Option<String>) -> Self {
        self.admin_email = admin_email;
        self
    }

    /// Database the engine writes to.
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Feed source the engine fetches from.
    pub fn source(&self) -> &Arc<dyn FeedSource> {
        &self.source
    }

    /// Refresh settings.
    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    /// Refresh a feed addressed by ID or URL.
    pub async fn refresh_target(&self, target: &FeedTarget) -> RefreshOutcome {
        let feeds = FeedRepository::new(self.db.pool());
        let found = match target {
            FeedTarget::Id(id) => feeds.get_by_id(*id).await,
            FeedTarget::Url(url) => feeds.get_by_url(url).await,
        };
        match found {
            Ok(Some(feed)) => self.refresh(feed.id).await,
            Ok(None) => {
                warn!("Cannot refresh {}: not found", target);
                RefreshOutcome::Skipped {
                    reason: format!("{} not found", target),
                }
            }
            Err(e) => {
                error!("Failed to load {}: {}", target, e);
                RefreshOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Refresh one feed.
    pub async fn refresh(&self, feed_id: i64) -> RefreshOutcome {
        let feed = match FeedRepository::new(self.db.pool()).get_by_id(feed_id).await {
            Ok(Some(feed)) => feed,
            Ok(None) => {
                warn!("Cannot refresh feed {}: not found", feed_id);
                return RefreshOutcome::Skipped {
                    reason: format!("feed {} not found", feed_id),
                };
            }
            Err(e) => {
                error!("Failed to load feed {}: {}", feed_id, e);
                return RefreshOutcome::Skipped {
                    reason: e.to_string(),
                };
            }
        };

        debug!("Refreshing feed {}: {}", feed.id, feed.feed_url);
        match self.run(&feed).await {
            Ok(outcome) => {
                match &outcome {
                    RefreshOutcome::Updated { new_entries } => {
                        info!("Feed {} updated: {} new entries", feed.id, new_entries)
                    }
                    RefreshOutcome::Unchanged => debug!("Nothing to update: {}", feed.feed_url),
                    RefreshOutcome::Escalated { reason, notified } => warn!(
                        "Feed {} marked as error ({:?}, notified: {})",
                        feed.id, reason, notified
                    ),
                    RefreshOutcome::Skipped { .. } => {}
                }
                outcome
            }
            Err(e) => {
                error!("Refresh of feed {} aborted: {}", feed.id, e);
                RefreshOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn run(&self, feed: &Feed) -> Result<RefreshOutcome> {
        let parsed = match self.fetch_with_retry(&feed.feed_url).await {
            Ok(parsed) => parsed,
            Err(failure) => {
                let reason = EscalationReason::FetchFailed {
                    attempts: failure.attempts,
                    error: failure.error.to_string(),
                };
                return self.escalate(feed, reason).await;
            }
        };

        let feeds = FeedRepository::new(self.db.pool());
        // Re-read: the row may have changed while the fetch was in flight.
        let current = feeds
            .get_by_id(feed.id)
            .await?
            .ok_or_else(|| RssfeedError::NotFound(format!("feed {}", feed.id)))?;
        if current.status == FeedStatus::Updated && current.published_time == parsed.published {
            feeds.touch(feed.id).await?;
            return Ok(RefreshOutcome::Unchanged);
        }

        let (new_entries, failed) = self.merge_with_retry(feed.id, &parsed).await;
        if failed > 0 {
            return self
                .escalate(feed, EscalationReason::EntriesFailed { failed })
                .await;
        }

        let _guard = self.locks.lock(feed.id).await;
        feeds
            .mark_updated(feed.id, &FeedMetadata::from(&parsed), parsed.published)
            .await?;
        Ok(RefreshOutcome::Updated { new_entries })
    }

    async fn fetch_with_retry(&self, url: &str) -> std::result::Result<ParsedFeed, FetchFailure> {
        let attempts = self.config.maximum_retry + 1;
        let mut attempt = 1;
        loop {
            match self.source.fetch(url).await {
                Ok(parsed) => return Ok(parsed),
                Err(e) if attempt >= attempts => {
                    warn!("Failed to fetch {} after {} attempts: {}", url, attempt, e);
                    return Err(FetchFailure {
                        attempts: attempt,
                        error: e,
                    });
                }
                Err(e) => {
                    debug!("Fetch attempt {} of {} failed: {}", attempt, url, e);
                    attempt += 1;
                    sleep(self.config.retry_delay()).await;
                }
            }
        }
    }

    async fn merge_with_retry(&self, feed_id: i64, parsed: &ParsedFeed) -> (usize, usize) {
        let sink = FeedEntries {
            repo: EntryRepository::new(self.db.pool()),
            feed_id,
        };
        merge_entries(
            &sink,
            feed_id,
            &parsed.entries,
            self.config.maximum_retry,
            self.config.retry_delay(),
        )
        .await
    }

    async fn escalate(&self, feed: &Feed, reason: EscalationReason) -> Result<RefreshOutcome> {
        let previous = {
            let _guard = self.locks.lock(feed.id).await;
            FeedRepository::new(self.db.pool())
                .update_status(feed.id, FeedStatus::Error, Watermark::Keep)
                .await?
        };

        let notified = previous != FeedStatus::Error;
        if notified {
            self.notify_failure(feed).await;
        } else {
            debug!("Feed {} already in error, not notifying", feed.id);
        }
        Ok(RefreshOutcome::Escalated { reason, notified })
    }

    async fn notify_failure(&self, feed: &Feed) {
        let mut recipients = match FeedRepository::new(self.db.pool())
            .list_subscriber_emails(feed.id)
            .await
        {
            Ok(emails) => emails,
            Err(e) => {
                error!("Failed to list subscribers of feed {}: {}", feed.id, e);
                Vec::new()
            }
        };
        recipients.extend(self.admin_email.iter().cloned());

        let message = failure_message(&feed.feed_url);
        for recipient in &recipients {
            if let Err(e) = self.notifier.notify(recipient, &message).await {
                warn!("Failed to notify {}: {}", recipient, e);
            }
        }
    }
}

/// Where merged entries are stored.
#[async_trait]
trait EntrySink: Send + Sync {
    /// Store one entry. Returns whether it was new.
    async fn store(&self, entry: &ParsedEntry) -> Result<bool>;
}

/// Entries of one feed, stored through the entry repository.
struct FeedEntries<'a> {
    repo: EntryRepository<'a>,
    feed_id: i64,
}

#[async_trait]
impl<'a> EntrySink for FeedEntries<'a> {
    async fn store(&self, entry: &ParsedEntry) -> Result<bool> {
        let (_, created) = self
            .repo
            .upsert(entry.id.as_deref(), &NewEntry::from_parsed(self.feed_id, entry))
            .await?;
        Ok(created)
    }
}

/// Merge entries, retrying only the failures, for at most `maximum_retry`
/// extra passes. Returns the number of new entries and the size of the
/// final failed set.
async fn merge_entries(
    sink: &dyn EntrySink,
    feed_id: i64,
    entries: &[ParsedEntry],
    maximum_retry: u32,
    retry_delay: Duration,
) -> (usize, usize) {
    let mut pending: Vec<&ParsedEntry> = entries.iter().collect();
    let mut new_entries = 0;

    for pass in 0..=maximum_retry {
        if pass > 0 {
            debug!(
                "Retrying {} failed entries of feed {} (pass {})",
                pending.len(),
                feed_id,
                pass
            );
            sleep(retry_delay).await;
        }

        let mut failed = Vec::new();
        for entry in pending {
            match sink.store(entry).await {
                Ok(true) => new_entries += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to store entry of feed {}: {}", feed_id, e);
                    failed.push(entry);
                }
            }
        }
        pending = failed;
        if pending.is_empty() {
            break;
        }
    }

    (new_entries, pending.len())
}
