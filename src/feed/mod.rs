//! Feed aggregation for rssfeed.
//!
//! Feeds are shared by every subscriber and refreshed by a periodic
//! scheduler or on demand. Entries are deduplicated by guid and never
//! modified once stored.

pub mod fetcher;
pub mod lock;
pub mod refresh;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod types;

pub use fetcher::{parse_feed, validate_url, FeedSource, HttpFeedSource};
pub use lock::FeedLocks;
pub use refresh::{EscalationReason, RefreshEngine, RefreshOutcome};
pub use repository::{
    EntryRepository, FeedRepository, ReadMarkRepository, SubscriptionRepository,
};
pub use scheduler::{spawn_refresh, DispatchedRefresh, Scheduler};
pub use service::{FeedService, SubscribeOutcome};
pub use types::{
    Entry, EntryFilter, Feed, FeedMetadata, FeedStatus, FeedTarget, NewEntry, NewFeed,
    ParsedEntry, ParsedFeed, Subscription, Watermark,
};
