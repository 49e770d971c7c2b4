//! Feed repositories for rssfeed.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};

use super::types::{
    Entry, EntryFilter, Feed, FeedMetadata, FeedStatus, NewEntry, NewFeed, Subscription,
    Watermark,
};
use crate::datetime::{format_timestamp, parse_optional_timestamp, parse_timestamp};
use crate::db::DbPool;
use crate::{Result, RssfeedError};

/// Row type for feeds.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FeedRow {
    id: i64,
    feed_url: String,
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    language: Option<String>,
    published_time: Option<String>,
    last_updated: String,
    status: String,
}

impl TryFrom<FeedRow> for Feed {
    type Error = RssfeedError;

    fn try_from(row: FeedRow) -> Result<Self> {
        Ok(Feed {
            id: row.id,
            feed_url: row.feed_url,
            title: row.title,
            link: row.link,
            description: row.description,
            language: row.language,
            published_time: parse_optional_timestamp(row.published_time)?,
            last_updated: parse_timestamp(&row.last_updated)?,
            status: row.status.parse().map_err(RssfeedError::Database)?,
        })
    }
}

/// Row type for entries.
#[derive(Debug, Clone, sqlx::FromRow)]
struct EntryRow {
    id: i64,
    guid: String,
    feed_id: i64,
    title: Option<String>,
    link: Option<String>,
    description: String,
    author: Option<String>,
    published_time: Option<String>,
    created_time: String,
}

impl TryFrom<EntryRow> for Entry {
    type Error = RssfeedError;

    fn try_from(row: EntryRow) -> Result<Self> {
        Ok(Entry {
            id: row.id,
            guid: row.guid,
            feed_id: row.feed_id,
            title: row.title,
            link: row.link,
            description: row.description,
            author: row.author,
            published_time: parse_optional_timestamp(row.published_time)?,
            created_time: parse_timestamp(&row.created_time)?,
        })
    }
}

/// Row type for subscriptions.
#[derive(Debug, Clone, sqlx::FromRow)]
struct SubscriptionRow {
    id: i64,
    user_id: i64,
    feed_id: i64,
    subscribed_time: String,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = RssfeedError;

    fn try_from(row: SubscriptionRow) -> Result<Self> {
        Ok(Subscription {
            id: row.id,
            user_id: row.user_id,
            feed_id: row.feed_id,
            subscribed_time: parse_timestamp(&row.subscribed_time)?,
        })
    }
}

/// Repository for feed rows.
pub struct FeedRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FeedRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert a feed unless its URL is already stored.
    ///
    /// Returns the stored feed and whether this call created it. Concurrent
    /// callers with the same URL all get the same row.
    pub async fn insert_if_absent(&self, feed: &NewFeed) -> Result<(Feed, bool)> {
        if feed.feed_url.trim().is_empty() {
            return Err(RssfeedError::Validation("feed URL is empty".to_string()));
        }

        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO feeds (feed_url, title, link, description, language,
                               published_time, last_updated, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT(feed_url) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&feed.feed_url)
        .bind(&feed.metadata.title)
        .bind(&feed.metadata.link)
        .bind(&feed.metadata.description)
        .bind(&feed.metadata.language)
        .bind(feed.published_time.as_ref().map(format_timestamp))
        .bind(format_timestamp(&Utc::now()))
        .bind(FeedStatus::Creating.as_str())
        .fetch_optional(self.pool)
        .await?;

        let stored = self
            .get_by_url(&feed.feed_url)
            .await?
            .ok_or_else(|| RssfeedError::NotFound("feed".to_string()))?;
        Ok((stored, inserted.is_some()))
    }

    /// Get a feed by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Feed>> {
        let row = sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT id, feed_url, title, link, description, language,
                   published_time, last_updated, status
            FROM feeds WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Feed::try_from).transpose()
    }

    /// Get a feed by URL.
    pub async fn get_by_url(&self, feed_url: &str) -> Result<Option<Feed>> {
        let row = sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT id, feed_url, title, link, description, language,
                   published_time, last_updated, status
            FROM feeds WHERE feed_url = $1
            "#,
        )
        .bind(feed_url)
        .fetch_optional(self.pool)
        .await?;

        row.map(Feed::try_from).transpose()
    }

    /// List feeds the scheduler should refresh: at least one subscriber and
    /// not in the error state.
    pub async fn list_refreshable(&self) -> Result<Vec<Feed>> {
        let rows = sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT f.id, f.feed_url, f.title, f.link, f.description, f.language,
                   f.published_time, f.last_updated, f.status
            FROM feeds f
            WHERE f.status <> $1
              AND EXISTS (SELECT 1 FROM feed_subscriptions s WHERE s.feed_id = f.id)
            ORDER BY f.id
            "#,
        )
        .bind(FeedStatus::Error.as_str())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Feed::try_from).collect()
    }

    /// Write a new status, returning the status it replaced.
    ///
    /// Read and write happen in one transaction. `last_updated` only moves
    /// forward. Callers serialize per feed with [`FeedLocks`].
    ///
    /// [`FeedLocks`]: crate::feed::FeedLocks
    pub async fn update_status(
        &self,
        id: i64,
        status: FeedStatus,
        watermark: Watermark,
    ) -> Result<FeedStatus> {
        self.write_status(id, status, watermark, None).await
    }

    /// Settle a successful refresh: replace the descriptive fields, set the
    /// status to `updated` and the watermark to `published`, all in one
    /// transaction. Returns the status it replaced.
    pub async fn mark_updated(
        &self,
        id: i64,
        metadata: &FeedMetadata,
        published: Option<DateTime<Utc>>,
    ) -> Result<FeedStatus> {
        self.write_status(
            id,
            FeedStatus::Updated,
            Watermark::Set(published),
            Some(metadata),
        )
        .await
    }

    async fn write_status(
        &self,
        id: i64,
        status: FeedStatus,
        watermark: Watermark,
        metadata: Option<&FeedMetadata>,
    ) -> Result<FeedStatus> {
        let mut tx = self.pool.begin().await?;

        // Take the write lock before reading so the read cannot go stale.
        let locked = sqlx::query("UPDATE feeds SET status = status WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if locked == 0 {
            return Err(RssfeedError::NotFound("feed".to_string()));
        }

        let previous: String = sqlx::query_scalar("SELECT status FROM feeds WHERE id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        let previous: FeedStatus = previous.parse().map_err(RssfeedError::Database)?;

        if let Some(metadata) = metadata {
            sqlx::query(
                "UPDATE feeds SET title = $1, link = $2, description = $3, language = $4 WHERE id = $5",
            )
            .bind(&metadata.title)
            .bind(&metadata.link)
            .bind(&metadata.description)
            .bind(&metadata.language)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        let now = format_timestamp(&Utc::now());
        match watermark {
            Watermark::Keep => {
                sqlx::query(
                    "UPDATE feeds SET status = $1, last_updated = MAX(last_updated, $2) WHERE id = $3",
                )
                .bind(status.as_str())
                .bind(&now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            }
            Watermark::Set(published) => {
                sqlx::query(
                    r#"
                    UPDATE feeds
                    SET status = $1, last_updated = MAX(last_updated, $2), published_time = $3
                    WHERE id = $4
                    "#,
                )
                .bind(status.as_str())
                .bind(&now)
                .bind(published.as_ref().map(format_timestamp))
                .bind(id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(previous)
    }

    /// Record a refresh attempt that changed nothing.
    pub async fn touch(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE feeds SET last_updated = MAX(last_updated, $1) WHERE id = $2")
            .bind(format_timestamp(&Utc::now()))
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Email addresses of every subscriber of a feed.
    pub async fn list_subscriber_emails(&self, feed_id: i64) -> Result<Vec<String>> {
        let emails = sqlx::query_scalar(
            r#"
            SELECT u.email
            FROM feed_subscriptions s
            JOIN users u ON u.id = s.user_id
            WHERE s.feed_id = $1
            ORDER BY s.id
            "#,
        )
        .bind(feed_id)
        .fetch_all(self.pool)
        .await?;
        Ok(emails)
    }
}

/// Repository for entry rows.
pub struct EntryRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> EntryRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Store an entry unless its guid is already known.
    ///
    /// An existing entry is returned unchanged even when it belongs to a
    /// different feed. Returns the stored entry and whether it was created.
    /// Runs in its own transaction; every failure is reported as
    /// [`RssfeedError::EntryPersistence`].
    pub async fn upsert(&self, guid: Option<&str>, entry: &NewEntry) -> Result<(Entry, bool)> {
        let guid = match guid {
            Some(g) if !g.trim().is_empty() => g,
            _ => {
                return Err(RssfeedError::EntryPersistence(
                    "entry has no stable identifier".to_string(),
                ))
            }
        };
        let persist = |e: sqlx::Error| RssfeedError::EntryPersistence(format!("{guid}: {e}"));

        let mut tx = self.pool.begin().await.map_err(persist)?;

        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO entries (guid, feed_id, title, link, description, author,
                                 published_time, created_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT(guid) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(guid)
        .bind(entry.feed_id)
        .bind(&entry.title)
        .bind(&entry.link)
        .bind(&entry.description)
        .bind(&entry.author)
        .bind(entry.published_time.as_ref().map(format_timestamp))
        .bind(format_timestamp(&Utc::now()))
        .fetch_optional(&mut *tx)
        .await
        .map_err(persist)?;

        let row = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT id, guid, feed_id, title, link, description, author,
                   published_time, created_time
            FROM entries WHERE guid = $1
            "#,
        )
        .bind(guid)
        .fetch_one(&mut *tx)
        .await
        .map_err(persist)?;

        tx.commit().await.map_err(persist)?;
        let entry = Entry::try_from(row)
            .map_err(|e| RssfeedError::EntryPersistence(format!("{guid}: {e}")))?;
        Ok((entry, inserted.is_some()))
    }

    /// Get an entry by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Entry>> {
        let row = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT id, guid, feed_id, title, link, description, author,
                   published_time, created_time
            FROM entries WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Entry::try_from).transpose()
    }

    /// Get an entry by guid.
    pub async fn get_by_guid(&self, guid: &str) -> Result<Option<Entry>> {
        let row = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT id, guid, feed_id, title, link, description, author,
                   published_time, created_time
            FROM entries WHERE guid = $1
            "#,
        )
        .bind(guid)
        .fetch_optional(self.pool)
        .await?;

        row.map(Entry::try_from).transpose()
    }

    /// Count the entries stored for a feed.
    pub async fn count_by_feed(&self, feed_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE feed_id = $1")
            .bind(feed_id)
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// List entries of the user's subscribed feeds published at or after
    /// `since`, newest first.
    pub async fn list_for_user(
        &self,
        user_id: i64,
        filter: &EntryFilter,
        since: DateTime<Utc>,
    ) -> Result<Vec<Entry>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT e.id, e.guid, e.feed_id, e.title, e.link, e.description, e.author,
                   e.published_time, e.created_time
            FROM entries e
            JOIN feed_subscriptions s ON s.feed_id = e.feed_id
            WHERE s.user_id = "#,
        );
        query.push_bind(user_id);
        query.push(" AND e.published_time >= ");
        query.push_bind(format_timestamp(&since));

        if let Some(feed_id) = filter.feed_id {
            query.push(" AND e.feed_id = ");
            query.push_bind(feed_id);
        }
        if let Some(read) = filter.read {
            query.push(if read { " AND EXISTS" } else { " AND NOT EXISTS" });
            query.push(" (SELECT 1 FROM read_entries r WHERE r.entry_id = e.id AND r.user_id = ");
            query.push_bind(user_id);
            query.push(")");
        }
        query.push(" ORDER BY e.published_time DESC, e.id DESC");

        let rows = query
            .build_query_as::<EntryRow>()
            .fetch_all(self.pool)
            .await?;
        rows.into_iter().map(Entry::try_from).collect()
    }

    /// Get an entry if the user subscribes to its feed and it was published
    /// at or after `since`.
    pub async fn get_visible(
        &self,
        user_id: i64,
        entry_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Option<Entry>> {
        let row = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT e.id, e.guid, e.feed_id, e.title, e.link, e.description, e.author,
                   e.published_time, e.created_time
            FROM entries e
            JOIN feed_subscriptions s ON s.feed_id = e.feed_id
            WHERE e.id = $1 AND s.user_id = $2 AND e.published_time >= $3
            "#,
        )
        .bind(entry_id)
        .bind(user_id)
        .bind(format_timestamp(&since))
        .fetch_optional(self.pool)
        .await?;

        row.map(Entry::try_from).transpose()
    }
}

/// Repository for user subscriptions.
pub struct SubscriptionRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> SubscriptionRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Subscribe a user to a feed. Returns the subscription and whether it is new.
    pub async fn subscribe(&self, user_id: i64, feed_id: i64) -> Result<(Subscription, bool)> {
        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO feed_subscriptions (user_id, feed_id, subscribed_time)
            VALUES ($1, $2, $3)
            ON CONFLICT(user_id, feed_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(feed_id)
        .bind(format_timestamp(&Utc::now()))
        .fetch_optional(self.pool)
        .await?;

        let subscription = self
            .get(user_id, feed_id)
            .await?
            .ok_or_else(|| RssfeedError::NotFound("subscription".to_string()))?;
        Ok((subscription, inserted.is_some()))
    }

    /// Remove a subscription together with the user's read marks on the
    /// feed's entries. Returns false if the user was not subscribed.
    pub async fn unsubscribe(&self, user_id: i64, feed_id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            "DELETE FROM feed_subscriptions WHERE user_id = $1 AND feed_id = $2",
        )
        .bind(user_id)
        .bind(feed_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if removed > 0 {
            sqlx::query(
                r#"
                DELETE FROM read_entries
                WHERE user_id = $1
                  AND entry_id IN (SELECT id FROM entries WHERE feed_id = $2)
                "#,
            )
            .bind(user_id)
            .bind(feed_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(removed > 0)
    }

    /// Get a subscription.
    pub async fn get(&self, user_id: i64, feed_id: i64) -> Result<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, user_id, feed_id, subscribed_time
            FROM feed_subscriptions WHERE user_id = $1 AND feed_id = $2
            "#,
        )
        .bind(user_id)
        .bind(feed_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Subscription::try_from).transpose()
    }

    /// List the feeds a user subscribes to, oldest subscription first.
    pub async fn list_feeds(&self, user_id: i64) -> Result<Vec<Feed>> {
        let rows = sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT f.id, f.feed_url, f.title, f.link, f.description, f.language,
                   f.published_time, f.last_updated, f.status
            FROM feeds f
            JOIN feed_subscriptions s ON s.feed_id = f.id
            WHERE s.user_id = $1
            ORDER BY s.id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Feed::try_from).collect()
    }

    /// Count subscribers of a feed.
    pub async fn count_by_feed(&self, feed_id: i64) -> Result<i64> {
        let count =
            sqlx::query_scalar("SELECT COUNT(*) FROM feed_subscriptions WHERE feed_id = $1")
                .bind(feed_id)
                .fetch_one(self.pool)
                .await?;
        Ok(count)
    }
}

/// Repository for read marks.
pub struct ReadMarkRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ReadMarkRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Mark an entry read. Returns true if the mark is new.
    pub async fn mark_read(&self, user_id: i64, entry_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO read_entries (user_id, entry_id, read_time)
            VALUES ($1, $2, $3)
            ON CONFLICT(user_id, entry_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(entry_id)
        .bind(format_timestamp(&Utc::now()))
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Check whether the user has read an entry.
    pub async fn is_read(&self, user_id: i64, entry_id: i64) -> Result<bool> {
        let read: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM read_entries WHERE user_id = $1 AND entry_id = $2)",
        )
        .bind(user_id)
        .bind(entry_id)
        .fetch_one(self.pool)
        .await?;
        Ok(read)
    }

    /// Count a user's read marks.
    pub async fn count_by_user(&self, user_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM read_entries WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}
