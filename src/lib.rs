//! rssfeed - multi-user RSS/Atom feed aggregator
//!
//! Users subscribe to feeds; a background scheduler keeps every subscribed
//! feed current and marks feeds that keep failing as errored, notifying
//! their subscribers once.

pub mod config;
pub mod datetime;
pub mod db;
pub mod error;
pub mod feed;
pub mod logging;
pub mod notify;

pub use config::Config;
pub use db::{Database, NewUser, User, UserRepository};
pub use error::{Result, RssfeedError};
pub use feed::{
    Entry, EntryFilter, Feed, FeedService, FeedSource, FeedStatus, FeedTarget, HttpFeedSource,
    RefreshEngine, RefreshOutcome, Scheduler,
};
pub use notify::{LogNotifier, Notifier};
