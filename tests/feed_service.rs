//! Reader service tests: subscriptions, entry visibility and read marks.

mod common;

use chrono::{Duration, Utc};

use common::{document, entry, fresh_document, Fixture, ScriptedSource};
use rssfeed::feed::{
    EntryFilter, EntryRepository, FeedStatus, ReadMarkRepository, RefreshOutcome,
};
use rssfeed::RssfeedError;

const FEED_URL: &str = "https://example.com/rss";

#[tokio::test]
async fn test_subscribe_creates_feed_and_refreshes_it() {
    let published = Utc::now();
    let fx = Fixture::new(ScriptedSource::serving(fresh_document(published, "a", 3))).await;
    let alice = fx.user("alice").await;
    let service = fx.service();

    let outcome = service.subscribe(alice, FEED_URL).await.unwrap();
    assert!(outcome.newly_subscribed);
    assert_eq!(outcome.feed.feed_url, FEED_URL);
    assert_eq!(outcome.feed.status, FeedStatus::Creating);
    assert_eq!(outcome.feed.title.as_deref(), Some("Example Feed"));
    assert_eq!(outcome.subscription.user_id, alice);

    let refresh = outcome.initial_refresh.expect("initial refresh");
    assert_eq!(
        refresh.handle.await.unwrap(),
        RefreshOutcome::Updated { new_entries: 3 }
    );
    assert_eq!(fx.reload(outcome.feed.id).await.status, FeedStatus::Updated);

    let entries = service
        .list_entries(alice, &EntryFilter::new())
        .await
        .unwrap();
    assert_eq!(entries.len(), 3);
}

#[tokio::test]
async fn test_second_subscriber_shares_feed() {
    let fx = Fixture::new(ScriptedSource::serving(fresh_document(Utc::now(), "a", 1))).await;
    let alice = fx.user("alice").await;
    let bob = fx.user("bob").await;
    let service = fx.service();

    let first = service.subscribe(alice, FEED_URL).await.unwrap();
    first.initial_refresh.unwrap().handle.await.unwrap();
    let calls = fx.source.calls();

    let second = service.subscribe(bob, FEED_URL).await.unwrap();
    assert_eq!(second.feed.id, first.feed.id);
    assert!(second.newly_subscribed);
    assert!(second.initial_refresh.is_none());
    assert_eq!(fx.source.calls(), calls);

    let again = service.subscribe(bob, FEED_URL).await.unwrap();
    assert!(!again.newly_subscribed);
    assert_eq!(again.subscription.id, second.subscription.id);
}

#[tokio::test]
async fn test_subscribe_to_unreachable_feed_fails() {
    let fx = Fixture::new(ScriptedSource::failing()).await;
    let alice = fx.user("alice").await;

    let result = fx.service().subscribe(alice, FEED_URL).await;
    assert!(matches!(result, Err(RssfeedError::Validation(_))));
    assert!(fx
        .service()
        .list_subscriptions(alice)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_list_entries_filters() {
    let now = Utc::now();
    let fx = Fixture::new(ScriptedSource::serving(document(
        Some(now),
        vec![
            entry("new", Duration::hours(1)),
            entry("mid", Duration::hours(2)),
            entry("old", Duration::hours(3)),
        ],
    )))
    .await;
    let alice = fx.user("alice").await;
    let service = fx.service();
    let feed_id = {
        let outcome = service.subscribe(alice, FEED_URL).await.unwrap();
        outcome.initial_refresh.unwrap().handle.await.unwrap();
        outcome.feed.id
    };

    let all = service.list_entries(alice, &EntryFilter::new()).await.unwrap();
    let guids: Vec<&str> = all.iter().map(|e| e.guid.as_str()).collect();
    assert_eq!(guids, vec!["new", "mid", "old"]);

    assert!(service.mark_read(alice, all[1].id).await.unwrap());

    let unread = service
        .list_entries(alice, &EntryFilter::new().read(false))
        .await
        .unwrap();
    let guids: Vec<&str> = unread.iter().map(|e| e.guid.as_str()).collect();
    assert_eq!(guids, vec!["new", "old"]);

    let read = service
        .list_entries(alice, &EntryFilter::new().feed(feed_id).read(true))
        .await
        .unwrap();
    assert_eq!(read.len(), 1);
    assert_eq!(read[0].guid, "mid");

    let elsewhere = service
        .list_entries(alice, &EntryFilter::new().feed(feed_id + 1))
        .await
        .unwrap();
    assert!(elsewhere.is_empty());
}

#[tokio::test]
async fn test_retention_window_hides_old_entries() {
    let fx = Fixture::new(ScriptedSource::serving(document(
        Some(Utc::now()),
        vec![
            entry("recent", Duration::days(1)),
            entry("expired", Duration::days(8)),
        ],
    )))
    .await;
    let alice = fx.user("alice").await;
    let service = fx.service();
    let outcome = service.subscribe(alice, FEED_URL).await.unwrap();
    outcome.initial_refresh.unwrap().handle.await.unwrap();

    let visible = service.list_entries(alice, &EntryFilter::new()).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].guid, "recent");

    let expired = EntryRepository::new(fx.db.pool())
        .get_by_guid("expired")
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        service.get_entry(alice, expired.id).await,
        Err(RssfeedError::NotFound(_))
    ));
    assert!(matches!(
        service.mark_read(alice, expired.id).await,
        Err(RssfeedError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_entries_of_unsubscribed_feeds_are_hidden() {
    let fx = Fixture::new(ScriptedSource::serving(fresh_document(Utc::now(), "a", 2))).await;
    let alice = fx.user("alice").await;
    let bob = fx.user("bob").await;
    let service = fx.service();
    let outcome = service.subscribe(alice, FEED_URL).await.unwrap();
    outcome.initial_refresh.unwrap().handle.await.unwrap();

    let entries = service.list_entries(alice, &EntryFilter::new()).await.unwrap();
    assert!(service
        .list_entries(bob, &EntryFilter::new())
        .await
        .unwrap()
        .is_empty());
    assert!(matches!(
        service.get_entry(bob, entries[0].id).await,
        Err(RssfeedError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_mark_read_reports_new_marks() {
    let fx = Fixture::new(ScriptedSource::serving(fresh_document(Utc::now(), "a", 1))).await;
    let alice = fx.user("alice").await;
    let service = fx.service();
    let outcome = service.subscribe(alice, FEED_URL).await.unwrap();
    outcome.initial_refresh.unwrap().handle.await.unwrap();
    let entry_id = service.list_entries(alice, &EntryFilter::new()).await.unwrap()[0].id;

    let (_, read) = service.get_entry(alice, entry_id).await.unwrap();
    assert!(!read);
    assert!(service.mark_read(alice, entry_id).await.unwrap());
    assert!(!service.mark_read(alice, entry_id).await.unwrap());
    let (entry, read) = service.get_entry(alice, entry_id).await.unwrap();
    assert_eq!(entry.id, entry_id);
    assert!(read);
}

#[tokio::test]
async fn test_unsubscribe_clears_read_marks_of_that_feed_only() {
    let fx = Fixture::new(ScriptedSource::serving(fresh_document(Utc::now(), "a", 2))).await;
    let alice = fx.user("alice").await;
    let service = fx.service();

    let first = service.subscribe(alice, FEED_URL).await.unwrap();
    first.initial_refresh.unwrap().handle.await.unwrap();
    fx.source
        .serve(fresh_document(Utc::now(), "b", 2));
    let second = service
        .subscribe(alice, "https://other.example.com/rss")
        .await
        .unwrap();
    second.initial_refresh.unwrap().handle.await.unwrap();

    for entry in service.list_entries(alice, &EntryFilter::new()).await.unwrap() {
        service.mark_read(alice, entry.id).await.unwrap();
    }
    let marks = ReadMarkRepository::new(fx.db.pool());
    assert_eq!(marks.count_by_user(alice).await.unwrap(), 4);

    service.unsubscribe(alice, first.feed.id).await.unwrap();
    assert_eq!(marks.count_by_user(alice).await.unwrap(), 2);

    let feeds = service.list_subscriptions(alice).await.unwrap();
    assert_eq!(feeds.len(), 1);
    assert_eq!(feeds[0].id, second.feed.id);

    // Entries stay stored for other subscribers
    assert_eq!(
        EntryRepository::new(fx.db.pool())
            .count_by_feed(first.feed.id)
            .await
            .unwrap(),
        2
    );
    assert!(matches!(
        service.unsubscribe(alice, first.feed.id).await,
        Err(RssfeedError::NotFound(_))
    ));
}
