//! Periodic refresh scheduler.
//!
//! Every tick selects the feeds that have subscribers and are not in the
//! error state, then spawns one independent refresh task per feed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info};

use super::refresh::{RefreshEngine, RefreshOutcome};
use super::repository::FeedRepository;

/// A refresh task started by the scheduler or a manual trigger.
#[derive(Debug)]
pub struct DispatchedRefresh {
    pub feed_id: i64,
    pub handle: JoinHandle<RefreshOutcome>,
}

/// Spawn a refresh of one feed on the runtime.
pub fn spawn_refresh(engine: &Arc<RefreshEngine>, feed_id: i64) -> DispatchedRefresh {
    let engine = Arc::clone(engine);
    DispatchedRefresh {
        feed_id,
        handle: tokio::spawn(async move { engine.refresh(feed_id).await }),
    }
}

/// Periodic refresh scheduler.
pub struct Scheduler {
    engine: Arc<RefreshEngine>,
    interval: Duration,
}

impl Scheduler {
    /// Create a scheduler using the engine's configured update interval.
    pub fn new(engine: Arc<RefreshEngine>) -> Self {
        let interval = engine.config().update_interval();
        Self { engine, interval }
    }

    /// Create a scheduler with a custom interval.
    pub fn with_interval(engine: Arc<RefreshEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Run ticks until `shutdown` completes. The first tick fires immediately.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            "Refresh scheduler started (interval: {} seconds)",
            self.interval.as_secs()
        );

        let mut timer = interval(self.interval);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = timer.tick() => {
                    self.tick().await;
                }
            }
        }

        info!("Refresh scheduler stopped");
    }

    /// Dispatch one refresh per refreshable feed without waiting for them.
    ///
    /// A failing selection query is logged and nothing is dispatched.
    pub async fn tick(&self) -> Vec<DispatchedRefresh> {
        let feeds = match FeedRepository::new(self.engine.database().pool())
            .list_refreshable()
            .await
        {
            Ok(feeds) => feeds,
            Err(e) => {
                error!("Failed to list feeds to refresh: {}", e);
                return Vec::new();
            }
        };

        if feeds.is_empty() {
            debug!("No feeds to refresh");
            return Vec::new();
        }

        info!("Refreshing {} feed(s)", feeds.len());
        feeds
            .iter()
            .map(|feed| spawn_refresh(&self.engine, feed.id))
            .collect()
    }

    /// Run one tick and wait for every dispatched refresh.
    pub async fn run_once(&self) -> Vec<(i64, RefreshOutcome)> {
        let dispatched = self.tick().await;
        let ids: Vec<i64> = dispatched.iter().map(|d| d.feed_id).collect();
        let results = join_all(dispatched.into_iter().map(|d| d.handle)).await;

        ids.into_iter()
            .zip(results)
            .filter_map(|(feed_id, result)| match result {
                Ok(outcome) => Some((feed_id, outcome)),
                Err(e) => {
                    error!("Refresh task for feed {} failed: {}", feed_id, e);
                    None
                }
            })
            .collect()
    }
}
