//! Feed domain types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

/// Refresh status of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedStatus {
    /// Created from metadata, entries not populated yet.
    #[default]
    Creating,
    /// Last refresh merged every entry.
    Updated,
    /// Last refresh exhausted its retries.
    Error,
}

impl FeedStatus {
    /// Convert status to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedStatus::Creating => "creating",
            FeedStatus::Updated => "updated",
            FeedStatus::Error => "error",
        }
    }
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FeedStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "creating" => Ok(FeedStatus::Creating),
            "updated" => Ok(FeedStatus::Updated),
            "error" => Ok(FeedStatus::Error),
            _ => Err(format!("unknown feed status: {s}")),
        }
    }
}

/// A subscribable feed, shared by all of its subscribers.
#[derive(Debug, Clone)]
pub struct Feed {
    /// Feed ID.
    pub id: i64,
    /// Unique feed URL.
    pub feed_url: String,
    /// Feed title.
    pub title: Option<String>,
    /// Site URL the feed belongs to.
    pub link: Option<String>,
    /// Feed description.
    pub description: Option<String>,
    /// Declared language.
    pub language: Option<String>,
    /// Feed-level timestamp of the last successful refresh (watermark).
    pub published_time: Option<DateTime<Utc>>,
    /// When the last refresh attempt finished.
    pub last_updated: DateTime<Utc>,
    /// Refresh status.
    pub status: FeedStatus,
}

/// Metadata written when a feed row is created.
#[derive(Debug, Clone)]
pub struct NewFeed {
    /// Feed URL.
    pub feed_url: String,
    /// Metadata from the first parse.
    pub metadata: FeedMetadata,
    /// Feed-level timestamp from the first parse.
    pub published_time: Option<DateTime<Utc>>,
}

impl NewFeed {
    /// Create a new feed with no metadata.
    pub fn new(feed_url: impl Into<String>) -> Self {
        Self {
            feed_url: feed_url.into(),
            metadata: FeedMetadata::default(),
            published_time: None,
        }
    }

    /// Build the initial row from a parsed document. Entries are ignored.
    pub fn from_parsed(feed_url: impl Into<String>, parsed: &ParsedFeed) -> Self {
        Self {
            feed_url: feed_url.into(),
            metadata: FeedMetadata::from(parsed),
            published_time: parsed.published,
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = Some(title.into());
        self
    }
}

/// Descriptive fields of a feed, refreshed on every successful parse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedMetadata {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
}

impl From<&ParsedFeed> for FeedMetadata {
    fn from(parsed: &ParsedFeed) -> Self {
        Self {
            title: parsed.title.clone(),
            link: parsed.link.clone(),
            description: parsed.description.clone(),
            language: parsed.language.clone(),
        }
    }
}

/// How a status write treats the stored watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watermark {
    /// Leave `published_time` untouched.
    Keep,
    /// Replace `published_time`, possibly with nothing.
    Set(Option<DateTime<Utc>>),
}

/// One stored item of a feed. Immutable once created.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Entry ID.
    pub id: i64,
    /// Stable identifier from the source, the deduplication key.
    pub guid: String,
    /// Feed this entry belongs to.
    pub feed_id: i64,
    /// Entry title.
    pub title: Option<String>,
    /// Link to the original article.
    pub link: Option<String>,
    /// Summary with HTML stripped.
    pub description: String,
    /// Author name.
    pub author: Option<String>,
    /// Entry-level timestamp from the source.
    pub published_time: Option<DateTime<Utc>>,
    /// When the entry was stored.
    pub created_time: DateTime<Utc>,
}

/// Entry fields for creation. The guid is passed separately to the upsert.
#[derive(Debug, Clone)]
pub struct NewEntry {
    /// Feed ID.
    pub feed_id: i64,
    /// Entry title.
    pub title: Option<String>,
    /// Link to the original article.
    pub link: Option<String>,
    /// Summary.
    pub description: String,
    /// Author name.
    pub author: Option<String>,
    /// Entry-level timestamp.
    pub published_time: Option<DateTime<Utc>>,
}

impl NewEntry {
    /// Create a new entry with empty fields.
    pub fn new(feed_id: i64) -> Self {
        Self {
            feed_id,
            title: None,
            link: None,
            description: String::new(),
            author: None,
            published_time: None,
        }
    }

    /// Copy the fields of a parsed entry.
    pub fn from_parsed(feed_id: i64, parsed: &ParsedEntry) -> Self {
        Self {
            feed_id,
            title: parsed.title.clone(),
            link: parsed.link.clone(),
            description: parsed.description.clone().unwrap_or_default(),
            author: parsed.author.clone(),
            published_time: parsed.published,
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the published time.
    pub fn with_published_time(mut self, published_time: DateTime<Utc>) -> Self {
        self.published_time = Some(published_time);
        self
    }
}

/// A user's subscription to a feed.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub subscribed_time: DateTime<Utc>,
}

/// Parsed feed document from a feed source.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    /// Feed title.
    pub title: Option<String>,
    /// Site URL.
    pub link: Option<String>,
    /// Feed description.
    pub description: Option<String>,
    /// Declared language.
    pub language: Option<String>,
    /// First present of the published and updated timestamps.
    pub published: Option<DateTime<Utc>>,
    /// Entries in document order.
    pub entries: Vec<ParsedEntry>,
}

/// Parsed entry from a feed source.
#[derive(Debug, Clone, Default)]
pub struct ParsedEntry {
    /// Stable identifier (RSS guid or Atom id). `None` when the source gave none.
    pub id: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    /// First present of the published and updated timestamps.
    pub published: Option<DateTime<Utc>>,
}

impl ParsedEntry {
    /// Create a parsed entry with the given identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the published time.
    pub fn with_published(mut self, published: DateTime<Utc>) -> Self {
        self.published = Some(published);
        self
    }
}

/// Reader-side entry filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryFilter {
    /// Restrict to one feed.
    pub feed_id: Option<i64>,
    /// `Some(true)` read only, `Some(false)` unread only.
    pub read: Option<bool>,
}

impl EntryFilter {
    /// Match every visible entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one feed.
    pub fn feed(mut self, feed_id: i64) -> Self {
        self.feed_id = Some(feed_id);
        self
    }

    /// Restrict to read or unread entries.
    pub fn read(mut self, read: bool) -> Self {
        self.read = Some(read);
        self
    }
}

/// Feed addressed by ID or URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedTarget {
    Id(i64),
    Url(String),
}

impl From<i64> for FeedTarget {
    fn from(id: i64) -> Self {
        FeedTarget::Id(id)
    }
}

impl From<&str> for FeedTarget {
    fn from(url: &str) -> Self {
        FeedTarget::Url(url.to_string())
    }
}

impl From<String> for FeedTarget {
    fn from(url: String) -> Self {
        FeedTarget::Url(url)
    }
}

impl fmt::Display for FeedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedTarget::Id(id) => write!(f, "feed {id}"),
            FeedTarget::Url(url) => write!(f, "feed {url}"),
        }
    }
}
