//! Failure notification.

use async_trait::async_trait;
use tracing::info;

use crate::Result;

/// Delivers a plain-text notice to a recipient address.
///
/// The refresh engine logs and ignores delivery failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: &str, message: &str) -> Result<()>;
}

/// Notifier that writes notices to the log instead of sending mail.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, recipient: &str, message: &str) -> Result<()> {
        info!(recipient, "Notification: {}", message);
        Ok(())
    }
}

/// Message sent when a feed escalates to the error state.
pub fn failure_message(feed_url: &str) -> String {
    format!("failed to update {}", feed_url)
}
