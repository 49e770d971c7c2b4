//! Per-feed serialization of status writes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Keyed async mutex, one lock per feed ID.
///
/// Cloning shares the lock table. Locks are created on first use and live as
/// long as the table.
#[derive(Debug, Clone, Default)]
pub struct FeedLocks {
    locks: Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>,
}

impl FeedLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a feed.
    pub async fn lock(&self, feed_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(feed_id).or_default())
        };
        lock.lock_owned().await
    }
}
